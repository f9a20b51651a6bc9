//! Event delivery: batching, retry and the sinks batches are handed to.

mod buffer;
mod event;
mod schedule;
mod sink;

#[cfg(feature = "gateway")]
mod gateway;

pub use buffer::{BufferStats, DeliveryBuffer, QueuedEvent};
pub use event::{AppFocusEvent, PromptSubmitEvent, TelemetryEvent, ValidationError};
pub use schedule::TimerSlot;
pub use sink::{DeliveryError, DeliverySink, JsonlSink, MemorySink};

#[cfg(feature = "gateway")]
pub use gateway::{BatchMeta, EventBatchPayload, GatewayConfig, HttpSink};
