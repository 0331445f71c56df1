use std::sync::{Arc, Barrier};

pub struct TaskMeta {
    pub name: &'static str,
    pub stack_bytes: Option<usize>,
}

pub trait AppTask {
    fn meta(&self) -> TaskMeta;

    /// Consume the task and return the closure that runs its loop.
    fn into_runner(self: Box<Self>) -> Box<dyn FnOnce() + Send + 'static>;
}

pub trait Spawner {
    fn spawn(&self, meta: TaskMeta, f: Box<dyn FnOnce() + Send + 'static>) -> std::io::Result<()>;
}

pub fn start_all(tasks: Vec<Box<dyn AppTask>>) -> std::io::Result<()> {
    let spawner = ThreadSpawner;

    // +1 for the supervisor/main thread to release everybody
    let barrier = Arc::new(Barrier::new(tasks.len() + 1));

    // Build all runners first so no task starts before every channel end is placed
    let mut runners: Vec<(TaskMeta, Box<dyn FnOnce() + Send>)> = Vec::with_capacity(tasks.len());
    for t in tasks {
        let meta = t.meta();
        let runner = t.into_runner();
        runners.push((meta, runner));
    }

    for (meta, runner) in runners {
        let b = barrier.clone();
        log::debug!("spawning task {}", meta.name);
        spawner.spawn(meta, Box::new(move || {
            b.wait();
            runner();
        }))?;
    }

    // Release them all at once.
    barrier.wait();
    Ok(())
}

pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, meta: TaskMeta, f: Box<dyn FnOnce() + Send + 'static>) -> std::io::Result<()> {
        let mut b = std::thread::Builder::new().name(meta.name.into());
        if let Some(stack_sz) = meta.stack_bytes {
            b = b.stack_size(stack_sz);
        }

        b.spawn(f).map(|_| ())
    }
}
