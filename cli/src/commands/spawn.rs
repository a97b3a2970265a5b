//! Spawn command implementation

use anyhow::{Context, Result};
use cadence_agent::intercept::{cadence_pthread_create, cadence_pthread_join};
use cadence_agent::{intercept, lifecycle, thread_state, Config};
use cadence_shared::types::identity::TimerId;
use cadence_shared::utils::parse_size;
use clap::Args;
use libc::c_void;
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;

use crate::output;

#[derive(Args, Debug)]
pub struct SpawnArgs {
    /// Number of workers to spawn
    #[arg(short, long, default_value = "4")]
    pub threads: usize,

    /// Milliseconds of work per worker
    #[arg(long, default_value = "10")]
    pub work_ms: u64,

    /// Each worker also spawns and joins one child
    #[arg(long)]
    pub nested: bool,

    /// Create workers with the C-ABI pthread wrappers instead of std threads
    #[arg(long)]
    pub pthread: bool,

    /// Stack size for workers (e.g. "16k", "1M")
    #[arg(long, default_value = "1M", env = "CADENCE_PTHREAD_STACK_SIZE")]
    pub stack_size: String,

    /// Write the JSON report here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

extern "C" fn pthread_worker(arg: *mut c_void) -> *mut c_void {
    std::thread::sleep(Duration::from_millis(arg as u64));
    arg
}

fn work(ms: u64, nested: bool) {
    std::thread::sleep(Duration::from_millis(ms));
    if nested {
        if let Ok(child) = intercept::spawn_named("child", move || {
            std::thread::sleep(Duration::from_millis(ms / 2))
        }) {
            let _ = child.join();
        }
    }
}

fn spawn_std(args: &SpawnArgs) -> Result<()> {
    let handles = (0..args.threads)
        .map(|i| {
            let (ms, nested) = (args.work_ms, args.nested);
            intercept::spawn_named(format!("worker-{}", i), move || work(ms, nested))
                .context("Failed to spawn worker")
        })
        .collect::<Result<Vec<_>>>()?;

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow::anyhow!("Worker panicked"))?;
    }
    Ok(())
}

fn spawn_pthread(args: &SpawnArgs) -> Result<()> {
    let mut threads = Vec::with_capacity(args.threads);
    for _ in 0..args.threads {
        let mut thread: libc::pthread_t = 0;
        let arg = args.work_ms as usize as *mut c_void;
        // SAFETY: `thread` is a valid out-pointer and the worker only reads
        // its argument as an integer.
        let rc = unsafe { cadence_pthread_create(&mut thread, ptr::null(), pthread_worker, arg) };
        if rc != 0 {
            anyhow::bail!("pthread_create failed with code {}", rc);
        }
        threads.push(thread);
    }

    for thread in threads {
        let mut retval: *mut c_void = ptr::null_mut();
        // SAFETY: each thread was created above and is joined once.
        let rc = unsafe { cadence_pthread_join(thread, &mut retval) };
        if rc != 0 {
            anyhow::bail!("pthread_join failed with code {}", rc);
        }
    }
    Ok(())
}

pub fn run(args: SpawnArgs) -> Result<()> {
    let stack_size = parse_size(&args.stack_size)
        .with_context(|| format!("Invalid stack size: {}", args.stack_size))?;

    let defaults = Config::default();
    let session = lifecycle::init(Config {
        stack_size,
        output_path: args.output.clone().or_else(|| defaults.output_path.clone()),
        program: "cadence spawn".to_string(),
        ..defaults
    })?;
    let output_path = lifecycle::runtime().and_then(|rt| rt.config().output_path.clone());

    let main_timer = thread_state::start(Some(TimerId::name("main")));
    if args.pthread {
        spawn_pthread(&args)?;
    } else {
        spawn_std(&args)?;
    }
    if let Some(handle) = main_timer {
        thread_state::stop(handle);
    }

    let report = session
        .finish()
        .context("Measurement runtime was not running")?;

    output::header("Timers");
    output::timer_table(&report.timers);

    output::header("Task graph");
    output::task_graph(&report.task_edges);

    output::success(&format!(
        "{} tasks, {} threads registered, {} exited",
        report.task_edges.len(),
        report.threads_registered,
        report.threads_exited
    ));
    if let Some(path) = &output_path {
        output::info(&format!("Report written to {}", path.display()));
    }
    Ok(())
}
