use std::sync::mpsc::channel;

use log::info;
use telephony_host::{HostEngine, HostRadio};
use thiserror::Error;

use crate::tasks::{
    console::ConsoleTask,
    dispatch::{ChannelSink, DispatchTask},
    notify::NotifyTask,
    task::{start_all, AppTask},
};

mod messages;
mod settings;
mod tasks;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("task error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn run() -> Result<(), AppError> {
    let policy = settings::policy(&settings::SETTINGS);
    info!(
        "starting CLB bridge on {} ({:?})",
        settings::SETTINGS.device_model,
        policy
    );

    let engine = HostEngine::new();
    let radio = HostRadio::new();

    // Create channels
    let (dispatch_tx, dispatch_rx) = channel::<messages::DispatchEvent>();
    let (status_tx, status_rx) = channel::<clb_core::StatusUpdate>();
    let (shutdown_tx, shutdown_rx): (messages::ShutdownSender, messages::ShutdownReceiver) =
        channel();

    let dispatch_task = Box::new(DispatchTask::new(
        engine.clone(),
        radio.clone(),
        ChannelSink::new(status_tx),
        policy,
        dispatch_tx.clone(),
        dispatch_rx,
    ));

    let console_task = Box::new(ConsoleTask::new(
        engine,
        radio,
        dispatch_tx,
        shutdown_tx,
    ));

    let notify_task = Box::new(NotifyTask::new(status_rx));

    let tasks: Vec<Box<dyn AppTask>> = vec![
        notify_task,
        dispatch_task,
        console_task,
    ];

    start_all(tasks)?;

    // Block until the console closes; the other tasks die with the process.
    let _ = shutdown_rx.recv();
    info!("shutting down");
    Ok(())
}
