use super::{types::*, AutomationSurface, QueueSource};
use crate::config;
use crate::error::{Error, Result};
use crate::scanner::PortalJobRecord;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Drives one long-lived browser-driver process over line-delimited JSON.
///
/// Each request is one JSON object on the child's stdin; each reply is one
/// JSON object on its stdout. Stderr is drained to debug logs so a chatty
/// driver cannot block on a full pipe.
pub struct BridgeSurface {
    inner: Mutex<Option<BridgeProcess>>,
    timeout: Duration,
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<String>,
}

impl BridgeSurface {
    pub fn spawn(cfg: &config::Surface) -> Result<Self> {
        if cfg.program.trim().is_empty() {
            return Err(Error::Config("surface.program is empty".into()));
        }
        let mut cmd = Command::new(&cfg.program);
        cmd.args(&cfg.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        for (k, v) in &cfg.env {
            cmd.env(k, v);
        }

        debug!("spawning bridge {} {:?}", cfg.program, cfg.args);
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::automation(format!("spawning bridge {}: {e}", cfg.program)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::automation("bridge has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::automation("bridge has no stdout"))?;

        let (tx, replies) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        if let Some(stderr) = child.stderr.take() {
            let log_stderr = cfg.log_stderr;
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                    if log_stderr {
                        debug!(target: "bridge", "{}", line.trim_end());
                    }
                }
            });
        }

        Ok(Self {
            inner: Mutex::new(Some(BridgeProcess {
                child,
                stdin,
                replies,
            })),
            timeout: Duration::from_secs(cfg.request_timeout_seconds.max(1)),
        })
    }

    fn request(&self, req: &BridgeRequest) -> Result<serde_json::Value> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| Error::automation(format!("bridge lock poisoned: {e}")))?;
        let Some(process) = guard.as_mut() else {
            return Err(Error::automation("bridge process is not running"));
        };

        let mut line = serde_json::to_string(req)
            .map_err(|e| Error::automation(format!("encoding {} request: {e}", req.op())))?;
        line.push('\n');
        debug!("bridge -> {}", req.op());
        if let Err(e) = process
            .stdin
            .write_all(line.as_bytes())
            .and_then(|_| process.stdin.flush())
        {
            *guard = None;
            return Err(Error::automation(format!("bridge stdin closed: {e}")));
        }

        let raw = match process.replies.recv_timeout(self.timeout) {
            Ok(raw) => raw,
            Err(RecvTimeoutError::Timeout) => {
                warn!("bridge {} timed out after {:?}", req.op(), self.timeout);
                if let Some(mut dead) = guard.take() {
                    let _ = dead.child.kill();
                    let _ = dead.child.wait();
                }
                return Err(Error::automation(format!(
                    "bridge {} exceeded timeout ({:?})",
                    req.op(),
                    self.timeout
                )));
            }
            Err(RecvTimeoutError::Disconnected) => {
                *guard = None;
                return Err(Error::automation("bridge process exited"));
            }
        };

        let reply: BridgeReply = serde_json::from_str(&raw)
            .map_err(|e| Error::automation(format!("parsing bridge reply to {}: {e}", req.op())))?;
        if !reply.ok {
            let msg = reply
                .error
                .unwrap_or_else(|| format!("{} failed", req.op()));
            return Err(Error::automation(msg));
        }
        Ok(reply.value)
    }

    fn request_bool(&self, req: &BridgeRequest) -> Result<bool> {
        let value = self.request(req)?;
        value
            .as_bool()
            .ok_or_else(|| Error::automation(format!("{} returned non-boolean {value}", req.op())))
    }

    pub fn doctor(&self) -> Result<BridgeDiag> {
        let value = self.request(&BridgeRequest::Ping)?;
        serde_json::from_value(value)
            .map_err(|e| Error::automation(format!("parsing ping diagnostics: {e}")))
    }
}

impl AutomationSurface for BridgeSurface {
    fn navigate(&self, url: &str) -> Result<()> {
        self.request(&BridgeRequest::Navigate { url: url.into() })
            .map(|_| ())
    }

    fn select_option(&self, picker_id: &str, search_text: &str) -> Result<bool> {
        self.request_bool(&BridgeRequest::SelectOption {
            picker: picker_id.into(),
            text: search_text.into(),
        })
    }

    fn fill_field(&self, field_id: &str, value: &str) -> Result<()> {
        self.request(&BridgeRequest::FillField {
            field: field_id.into(),
            value: value.into(),
        })
        .map(|_| ())
    }

    fn click(&self, action_id: &str) -> Result<bool> {
        self.request_bool(&BridgeRequest::Click {
            action: action_id.into(),
        })
    }

    fn read_current_url(&self) -> Result<String> {
        let value = self.request(&BridgeRequest::CurrentUrl)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn accept_pending_alert(&self) -> Result<Option<String>> {
        let value = self.request(&BridgeRequest::AcceptAlert)?;
        Ok(value.as_str().map(str::to_string))
    }
}

impl QueueSource for BridgeSurface {
    fn scan_queue(&self, queue_url: &str) -> Result<Vec<PortalJobRecord>> {
        let value = self.request(&BridgeRequest::ScanQueue {
            url: queue_url.into(),
        })?;
        serde_json::from_value(value)
            .map_err(|e| Error::automation(format!("parsing queue rows: {e}")))
    }
}

impl Drop for BridgeSurface {
    fn drop(&mut self) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        if let Some(mut process) = guard.take() {
            if let Ok(line) = serde_json::to_string(&BridgeRequest::Quit) {
                let _ = writeln!(process.stdin, "{line}");
            }
            let _ = process.stdin.flush();
            drop(process.stdin);
            std::thread::sleep(Duration::from_millis(100));
            if let Ok(None) = process.child.try_wait() {
                let _ = process.child.kill();
            }
            let _ = process.child.wait();
        }
    }
}
