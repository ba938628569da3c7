//! Console sink interface (§6.2): a trivial adapter the Façade writes to.
//!
//! Only the method signatures are fixed; `TracingConsoleSink` is `klog`'s
//! batteries-included default, routing diagnostic output through `tracing`
//! rather than `println!`/`eprintln!` (§10). A host application that already
//! owns its own log pipeline (a mobile platform logger, a desktop app's log
//! pane) can implement [`ConsoleSink`] directly instead.

/// Receives a fully preformatted display line (§6.2).
pub trait ConsoleSink: Send + Sync {
    fn log(&self, tag: &str, message: &str);
    fn log_w(&self, tag: &str, message: &str);
    fn log_e(&self, tag: &str, message: &str, throwable: Option<&str>);
}

/// Default sink: forwards to `tracing::info!`/`warn!`/`error!` under the
/// `klog::console` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingConsoleSink;

impl ConsoleSink for TracingConsoleSink {
    fn log(&self, tag: &str, message: &str) {
        tracing::info!(target: "klog::console", tag, "{message}");
    }

    fn log_w(&self, tag: &str, message: &str) {
        tracing::warn!(target: "klog::console", tag, "{message}");
    }

    fn log_e(&self, tag: &str, message: &str, throwable: Option<&str>) {
        match throwable {
            Some(cause) => {
                tracing::error!(target: "klog::console", tag, cause, "{message}");
            }
            None => {
                tracing::error!(target: "klog::console", tag, "{message}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl ConsoleSink for RecordingSink {
        fn log(&self, tag: &str, message: &str) {
            self.lines.lock().unwrap().push(format!("[{tag}] {message}"));
        }

        fn log_w(&self, tag: &str, message: &str) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("[{tag}] WARNING {message}"));
        }

        fn log_e(&self, tag: &str, message: &str, throwable: Option<&str>) {
            let suffix = throwable.map(|t| format!(" ({t})")).unwrap_or_default();
            self.lines
                .lock()
                .unwrap()
                .push(format!("[{tag}] ERROR {message}{suffix}"));
        }
    }

    #[test]
    fn host_supplied_sink_receives_preformatted_lines() {
        let sink = RecordingSink::default();
        sink.log("T", "hello");
        sink.log_w("T", "careful");
        sink.log_e("T", "boom", Some("cause"));

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines[0], "[T] hello");
        assert_eq!(lines[1], "[T] WARNING careful");
        assert_eq!(lines[2], "[T] ERROR boom (cause)");
    }

    #[test]
    fn tracing_console_sink_does_not_panic_without_a_subscriber() {
        let sink = TracingConsoleSink;
        sink.log("T", "hello");
        sink.log_w("T", "careful");
        sink.log_e("T", "boom", None);
        sink.log_e("T", "boom", Some("cause"));
    }
}
