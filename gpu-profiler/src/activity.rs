//! Canonical identity of asynchronous hardware activity
//!
//! Every unit of asynchronous work (a stream launch, a command-queue
//! submission, or a synchronous stand-in when no accelerator backend is
//! present) gets one `ActivityKey`. Keys are bucketed per physical execution
//! resource; the activity tag only splits buckets when extended correlation
//! is on.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// What kind of work an asynchronous activity performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Kernel,
    Memory,
    Synchronize,
    Other,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActivityKind::Kernel => "kernel",
            ActivityKind::Memory => "memory",
            ActivityKind::Synchronize => "synchronize",
            ActivityKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Key of one asynchronous execution resource plus the activity tag.
///
/// The derived `Eq`/`Ord` are exact and structural (equivalent to
/// `correlation_cmp(.., true)`). Use [`ActivityKey::correlation_cmp`] or
/// [`CorrelationKey`] when the activity tag must be switchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ActivityKey {
    /// Hardware-queue model: device, context, stream
    Stream {
        device: u32,
        context: u32,
        stream: u32,
        activity: ActivityKind,
    },

    /// Command-queue model: device, queue
    Queue {
        device: u32,
        queue: u32,
        activity: ActivityKind,
    },

    /// Device-only fallback when no asynchronous backend is present
    Device { device: u32, activity: ActivityKind },
}

impl ActivityKey {
    pub fn stream(device: u32, context: u32, stream: u32, activity: ActivityKind) -> Self {
        ActivityKey::Stream {
            device,
            context,
            stream,
            activity,
        }
    }

    pub fn queue(device: u32, queue: u32, activity: ActivityKind) -> Self {
        ActivityKey::Queue {
            device,
            queue,
            activity,
        }
    }

    pub fn device(device: u32, activity: ActivityKind) -> Self {
        ActivityKey::Device { device, activity }
    }

    /// Shape this key was built with
    pub fn model(&self) -> ActivityModel {
        match self {
            ActivityKey::Stream { .. } => ActivityModel::Stream,
            ActivityKey::Queue { .. } => ActivityModel::Queue,
            ActivityKey::Device { .. } => ActivityModel::Device,
        }
    }

    pub fn device_id(&self) -> u32 {
        match *self {
            ActivityKey::Stream { device, .. }
            | ActivityKey::Queue { device, .. }
            | ActivityKey::Device { device, .. } => device,
        }
    }

    pub fn activity(&self) -> ActivityKind {
        match *self {
            ActivityKey::Stream { activity, .. }
            | ActivityKey::Queue { activity, .. }
            | ActivityKey::Device { activity, .. } => activity,
        }
    }

    /// The same resource with a different activity tag
    pub fn with_activity(self, activity: ActivityKind) -> Self {
        match self {
            ActivityKey::Stream {
                device,
                context,
                stream,
                ..
            } => ActivityKey::stream(device, context, stream, activity),
            ActivityKey::Queue { device, queue, .. } => ActivityKey::queue(device, queue, activity),
            ActivityKey::Device { device, .. } => ActivityKey::device(device, activity),
        }
    }

    // Populated resource fields in ordering position; unpopulated ones are 0.
    fn resource(&self) -> (u32, u32, u32) {
        match *self {
            ActivityKey::Stream {
                device,
                context,
                stream,
                ..
            } => (device, context, stream),
            ActivityKey::Queue { device, queue, .. } => (device, queue, 0),
            ActivityKey::Device { device, .. } => (device, 0, 0),
        }
    }

    /// Lexicographic order over device, context-or-queue, stream and, only
    /// when `extended` is set, the activity tag.
    pub fn correlation_cmp(&self, other: &Self, extended: bool) -> Ordering {
        let ord = self
            .model()
            .cmp(&other.model())
            .then_with(|| self.resource().cmp(&other.resource()));
        if extended {
            ord.then_with(|| self.activity().cmp(&other.activity()))
        } else {
            ord
        }
    }
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKey::Stream {
                device,
                context,
                stream,
                activity,
            } => write!(
                f,
                "GPU [{}:{}:{}] {}",
                device, context, stream, activity
            ),
            ActivityKey::Queue {
                device,
                queue,
                activity,
            } => write!(f, "GPU [{}:{}] {}", device, queue, activity),
            ActivityKey::Device { device, activity } => {
                write!(f, "Device [{}] {}", device, activity)
            }
        }
    }
}

/// Which key shape a build or configuration produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityModel {
    Stream,
    Queue,
    Device,
}

impl ActivityModel {
    /// Shape selected by the enabled backend feature
    pub fn detect() -> Self {
        if cfg!(feature = "cuda") {
            ActivityModel::Stream
        } else if cfg!(feature = "rocm") {
            ActivityModel::Queue
        } else {
            ActivityModel::Device
        }
    }

    /// Build a key in this shape. `channel` is the context (stream model) or
    /// the queue (queue model); fields the shape does not carry are ignored.
    pub fn key(self, device: u32, channel: u32, stream: u32, activity: ActivityKind) -> ActivityKey {
        match self {
            ActivityModel::Stream => ActivityKey::stream(device, channel, stream, activity),
            ActivityModel::Queue => ActivityKey::queue(device, channel, activity),
            ActivityModel::Device => ActivityKey::device(device, activity),
        }
    }
}

impl std::str::FromStr for ActivityModel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" | "cuda" => Ok(ActivityModel::Stream),
            "queue" | "hip" | "rocm" => Ok(ActivityModel::Queue),
            "device" | "none" => Ok(ActivityModel::Device),
            _ => anyhow::bail!("Invalid activity model: {}", s),
        }
    }
}

/// Bucketing key: an `ActivityKey` whose equality and ordering both follow
/// `correlation_cmp` with a fixed extended-correlation switch.
///
/// All keys placed in one ordered collection must share the same switch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub key: ActivityKey,
    pub extended: bool,
}

impl CorrelationKey {
    pub fn new(key: ActivityKey, extended: bool) -> Self {
        Self { key, extended }
    }
}

impl PartialEq for CorrelationKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CorrelationKey {}

impl PartialOrd for CorrelationKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CorrelationKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .correlation_cmp(&other.key, self.extended && other.extended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [ActivityKind; 4] = [
        ActivityKind::Kernel,
        ActivityKind::Memory,
        ActivityKind::Synchronize,
        ActivityKind::Other,
    ];

    fn sample_keys() -> Vec<ActivityKey> {
        let mut keys = Vec::new();
        for device in 0..2 {
            for kind in KINDS {
                keys.push(ActivityKey::device(device, kind));
                keys.push(ActivityKey::queue(device, 1, kind));
                keys.push(ActivityKey::queue(device, 0, kind));
                keys.push(ActivityKey::stream(device, 1, 7, kind));
                keys.push(ActivityKey::stream(device, 1, 3, kind));
            }
        }
        keys
    }

    #[test]
    fn test_equality_is_structural() {
        let a = ActivityKey::stream(0, 1, 2, ActivityKind::Kernel);
        let b = ActivityKey::stream(0, 1, 2, ActivityKind::Kernel);
        let c = ActivityKey::stream(0, 1, 2, ActivityKind::Memory);

        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_ne!(a, c);
        assert_ne!(
            ActivityKey::device(0, ActivityKind::Kernel),
            ActivityKey::queue(0, 0, ActivityKind::Kernel)
        );
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let extended = true;
        let lo = ActivityKey::stream(0, 5, 9, ActivityKind::Other);
        let hi = ActivityKey::stream(1, 0, 0, ActivityKind::Kernel);
        assert_eq!(lo.correlation_cmp(&hi, extended), Ordering::Less);

        let a = ActivityKey::stream(0, 1, 2, ActivityKind::Other);
        let b = ActivityKey::stream(0, 1, 3, ActivityKind::Kernel);
        assert_eq!(a.correlation_cmp(&b, extended), Ordering::Less);

        let q1 = ActivityKey::queue(2, 1, ActivityKind::Kernel);
        let q2 = ActivityKey::queue(2, 4, ActivityKind::Kernel);
        assert_eq!(q1.correlation_cmp(&q2, false), Ordering::Less);
    }

    #[test]
    fn test_activity_collapsed_without_extended_correlation() {
        for shape in [ActivityModel::Stream, ActivityModel::Queue, ActivityModel::Device] {
            let kernel = shape.key(3, 1, 2, ActivityKind::Kernel);
            let memory = shape.key(3, 1, 2, ActivityKind::Memory);

            assert_ne!(kernel, memory);
            assert_eq!(kernel.correlation_cmp(&memory, false), Ordering::Equal);
            assert_eq!(kernel.correlation_cmp(&memory, true), Ordering::Less);
            assert_eq!(memory.correlation_cmp(&kernel, true), Ordering::Greater);
        }
    }

    #[test]
    fn test_extended_order_matches_derived_order() {
        let keys = sample_keys();
        for a in &keys {
            for b in &keys {
                assert_eq!(a.correlation_cmp(b, true), a.cmp(b), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_strict_weak_ordering() {
        let keys = sample_keys();
        for extended in [false, true] {
            for a in &keys {
                // irreflexive
                assert_ne!(a.correlation_cmp(a, extended), Ordering::Less);
                for b in &keys {
                    // asymmetric
                    assert_eq!(
                        a.correlation_cmp(b, extended),
                        b.correlation_cmp(a, extended).reverse()
                    );
                    for c in &keys {
                        let ab = a.correlation_cmp(b, extended);
                        let bc = b.correlation_cmp(c, extended);
                        let ac = a.correlation_cmp(c, extended);
                        // transitivity of < and of equivalence
                        if ab == Ordering::Less && bc == Ordering::Less {
                            assert_eq!(ac, Ordering::Less);
                        }
                        if ab == Ordering::Equal && bc == Ordering::Equal {
                            assert_eq!(ac, Ordering::Equal);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_correlation_key_buckets() {
        use std::collections::BTreeSet;

        let keys = [
            ActivityKey::stream(0, 1, 2, ActivityKind::Kernel),
            ActivityKey::stream(0, 1, 2, ActivityKind::Memory),
            ActivityKey::stream(0, 1, 3, ActivityKind::Kernel),
        ];

        let collapsed: BTreeSet<CorrelationKey> =
            keys.iter().map(|k| CorrelationKey::new(*k, false)).collect();
        assert_eq!(collapsed.len(), 2);

        let split: BTreeSet<CorrelationKey> =
            keys.iter().map(|k| CorrelationKey::new(*k, true)).collect();
        assert_eq!(split.len(), 3);
    }

    #[test]
    fn test_model_key_shapes() {
        let key = ActivityModel::Queue.key(1, 4, 99, ActivityKind::Memory);
        assert_eq!(key, ActivityKey::queue(1, 4, ActivityKind::Memory));
        assert_eq!(key.model(), ActivityModel::Queue);
        assert_eq!(key.device_id(), 1);
        assert_eq!(key.activity(), ActivityKind::Memory);

        let key = ActivityModel::Device.key(2, 4, 99, ActivityKind::Other);
        assert_eq!(key, ActivityKey::device(2, ActivityKind::Other));
        assert_eq!(
            key.with_activity(ActivityKind::Kernel).activity(),
            ActivityKind::Kernel
        );
    }

    #[test]
    fn test_model_from_str() {
        assert_eq!("cuda".parse::<ActivityModel>().unwrap(), ActivityModel::Stream);
        assert_eq!("HIP".parse::<ActivityModel>().unwrap(), ActivityModel::Queue);
        assert_eq!("none".parse::<ActivityModel>().unwrap(), ActivityModel::Device);
        assert!("opencl".parse::<ActivityModel>().is_err());
    }

    #[test]
    fn test_detect_without_backend_features() {
        if !cfg!(feature = "cuda") && !cfg!(feature = "rocm") {
            assert_eq!(ActivityModel::detect(), ActivityModel::Device);
        }
    }

    #[test]
    fn test_key_json_shape_tag() {
        let key = ActivityKey::queue(1, 2, ActivityKind::Kernel);
        let value = serde_json::to_value(key).unwrap();
        assert_eq!(value["shape"], "queue");
        assert_eq!(value["activity"], "kernel");
    }
}
