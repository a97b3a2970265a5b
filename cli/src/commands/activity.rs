//! Activity command implementation

use anyhow::Result;
use cadence_gpu::{
    ActivityKind, ActivityModel, ActivitySource, ActivityTable, AsyncActivity, SyncFallback,
};
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct ActivityArgs {
    /// Key shape: stream, queue or device (defaults to the build's backend)
    #[arg(short, long)]
    pub model: Option<ActivityModel>,

    /// Keep different activity kinds on one resource in separate buckets
    #[arg(short, long)]
    pub extended: bool,

    /// Number of devices in the synthetic mix
    #[arg(short, long, default_value = "2")]
    pub devices: u32,

    /// Channels (contexts or queues) per device
    #[arg(long, default_value = "2")]
    pub channels: u32,
}

const KINDS: [(ActivityKind, &str, u64); 3] = [
    (ActivityKind::Kernel, "gemm", 1_200_000),
    (ActivityKind::Memory, "copy_h2d", 300_000),
    (ActivityKind::Synchronize, "stream_sync", 50_000),
];

/// Deterministic mix of activities over every device and channel
fn synthetic(model: ActivityModel, devices: u32, channels: u32) -> Vec<AsyncActivity> {
    let mut activities = Vec::new();
    let mut clock = 0u64;
    for device in 0..devices {
        for channel in 0..channels {
            for (kind, name, duration) in KINDS {
                let duration = duration * u64::from(channel + 1);
                activities.push(AsyncActivity {
                    key: model.key(device, channel, channel, kind),
                    name: name.to_string(),
                    start_ns: clock,
                    end_ns: clock + duration,
                });
                clock += duration;
            }
        }
    }
    activities
}

pub fn run(args: ActivityArgs) -> Result<()> {
    let model = args.model.unwrap_or_else(ActivityModel::detect);
    let table = ActivityTable::new(args.extended);
    table.record_all(&synthetic(model, args.devices, args.channels));

    // Host-side work timed by the fallback source lands on its own device.
    let mut fallback = SyncFallback::new(args.devices);
    fallback.start()?;
    let checksum = fallback.run("host_reduce", ActivityKind::Kernel, || {
        (0..100_000u64).fold(0u64, |acc, x| acc.wrapping_add(x * x))
    });
    fallback.stop()?;
    table.record_all(&fallback.drain()?);

    output::header(&format!(
        "Activity ({:?} model, extended correlation {})",
        model,
        if table.extended() { "on" } else { "off" }
    ));
    output::activity_table(&table.snapshot());
    output::success(&format!(
        "{} buckets, {:.3} ms total (checksum {})",
        table.len(),
        table.total_time_ns() as f64 / 1_000_000.0,
        checksum
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_splits_buckets() {
        let activities = synthetic(ActivityModel::Stream, 2, 2);

        let collapsed = ActivityTable::new(false);
        collapsed.record_all(&activities);
        assert_eq!(collapsed.len(), 4);

        let extended = ActivityTable::new(true);
        extended.record_all(&activities);
        assert_eq!(extended.len(), 12);
    }

    #[test]
    fn test_device_model_merges_channels() {
        let table = ActivityTable::new(false);
        table.record_all(&synthetic(ActivityModel::Device, 3, 4));
        assert_eq!(table.len(), 3);
    }
}
