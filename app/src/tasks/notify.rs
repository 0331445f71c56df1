use std::io::Write;

use log::{info, warn};

use crate::messages::StatusReceiver;
use crate::tasks::task::{AppTask, TaskMeta};

/// Writes every published status to stdout for the hardware integration.
pub struct NotifyTask {
    rx: StatusReceiver,
}

impl AppTask for NotifyTask {
    fn into_runner(self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static> {
        Box::new(move || notify_loop(self.rx))
    }

    fn meta(&self) -> TaskMeta {
        TaskMeta {
            name: "notify",
            stack_bytes: None,
        }
    }
}

impl NotifyTask {
    pub fn new(rx: StatusReceiver) -> Self {
        Self { rx }
    }
}

fn notify_loop(rx: StatusReceiver) {
    let stdout = std::io::stdout();
    for update in rx.iter() {
        info!("notify_task: SIPSTATE {}", update);
        let mut out = stdout.lock();
        if let Err(e) = writeln!(out, "SIPSTATE {}", update).and_then(|_| out.flush()) {
            warn!("notify_task: stdout write failed: {}", e);
        }
    }
    info!("notify_task: status channel closed; exiting");
}
