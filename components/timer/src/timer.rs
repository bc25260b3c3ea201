//! Periodic tick streams.
//!
//! Every recurring job in this codebase is driven by a stream of
//! [`TimerTick`]s rather than by an internal clock, so tests can drive time
//! by hand through an `mpsc` sender. Production streams are produced here,
//! backed by [`futures-timer`][futures-timer].
//!
//! [futures-timer]: https://github.com/async-rs/futures-timer

use std::time::Duration;

use futures::channel::mpsc;
use futures::task::{Spawn, SpawnError, SpawnExt};
use futures::SinkExt;
use futures_timer::Delay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick;

/// Spawn a task producing one `TimerTick` per `interval`. The stream ends
/// when the receiver is dropped.
pub fn interval_stream<S>(
    interval: Duration,
    spawner: &S,
) -> Result<mpsc::Receiver<TimerTick>, SpawnError>
where
    S: Spawn,
{
    let (mut tick_sender, tick_receiver) = mpsc::channel(0);
    spawner.spawn(async move {
        loop {
            Delay::new(interval).await;
            if tick_sender.send(TimerTick).await.is_err() {
                // Receiver is gone, stop ticking.
                return;
            }
        }
    })?;
    Ok(tick_receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::executor::{block_on, ThreadPool};
    use futures::StreamExt;

    #[test]
    fn test_interval_stream_ticks() {
        let thread_pool = ThreadPool::new().unwrap();
        let tick_receiver = interval_stream(Duration::from_millis(1), &thread_pool).unwrap();
        let ticks = block_on(tick_receiver.take(3).collect::<Vec<_>>());
        assert_eq!(ticks, vec![TimerTick, TimerTick, TimerTick]);
    }
}
