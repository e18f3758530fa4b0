use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use crate::ipc::protocol::Response;

/// Writes responses as single lines, shared by the dispatch loop and download workers.
#[derive(Clone)]
pub struct ResponseSink {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ResponseSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn send(&self, response: &Response) {
        let line = match serde_json::to_string(response) {
            Ok(line) => line,
            Err(e) => {
                log::error!("could not encode response: {e}");
                return;
            }
        };

        let Ok(mut out) = self.out.lock() else {
            log::error!("response sink is poisoned, dropping response");
            return;
        };
        let written = writeln!(out, "{line}").and_then(|_| out.flush());
        if let Err(e) = written {
            log::error!("could not write response: {e}");
        }
    }
}

/// In-memory sink target for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
