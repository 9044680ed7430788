//! Pacing module.
//!
//! Mail services defend against abuse by rate, so consecutive
//! dispatches are separated by randomized waits, and freshly sent
//! messages are polled with short randomized backoffs.

use log::{debug, trace, warn};
use rand::Rng;
use std::{ops::RangeInclusive, thread, time::Duration};

use crate::mail::MailService;

/// Jitter applied around the configured delay between two dispatches.
pub const DELAY_JITTER_FACTOR: f64 = 0.1;

/// Blocking wait between two requests.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<T: Sleeper + ?Sized> Sleeper for &mut T {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Sleeps on the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Records waits without sleeping, for dry runs.
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    pub waits: Vec<Duration>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.waits.iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.waits.push(duration)
    }
}

/// Picks a duration uniformly within `[base × (1 - factor), base × (1 + factor)]`.
pub fn jitter(base: Duration, factor: f64) -> Duration {
    let base = base.as_secs_f64();
    random_between(base * (1.0 - factor)..=base * (1.0 + factor))
}

fn random_between(range: RangeInclusive<f64>) -> Duration {
    if range.start() >= range.end() {
        return Duration::from_secs_f64(range.start().max(0.0));
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(range).max(0.0))
}

/// Represents the bounded polling of a message header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderPoll {
    pub attempts: usize,
    /// Represents the bounds of the wait between two attempts, in
    /// seconds.
    pub backoff: RangeInclusive<f64>,
}

impl Default for HeaderPoll {
    fn default() -> Self {
        Self {
            attempts: 6,
            backoff: 1.0..=2.0,
        }
    }
}

impl HeaderPoll {
    /// Polls the given header of the given message until it is
    /// available or attempts are exhausted.
    pub fn poll<S, P>(&self, service: &mut S, sleeper: &mut P, id: &str, name: &str) -> Option<String>
    where
        S: MailService + ?Sized,
        P: Sleeper + ?Sized,
    {
        trace!(">> poll header {} of message {}", name, id);

        for attempt in 1..=self.attempts {
            match service.get_message_header(id, name) {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    debug!("header {} of message {}: {:?}", name, id, value);
                    trace!("<< poll header");
                    return Some(value.trim().to_owned());
                }
                Ok(_) => debug!("header {} of message {} not available yet", name, id),
                Err(err) => warn!("cannot get header {} of message {}: {}", name, id, err),
            }

            if attempt < self.attempts {
                sleeper.sleep(random_between(self.backoff.clone()));
            }
        }

        warn!(
            "header {} of message {} still unavailable after {} attempts",
            name, id, self.attempts
        );
        trace!("<< poll header");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mail::build_message, MemoryMailService};

    #[test]
    fn jitter_stays_in_bounds() {
        let base = Duration::from_secs(20);
        for _ in 0..1000 {
            let wait = jitter(base, DELAY_JITTER_FACTOR).as_secs_f64();
            assert!(wait >= 18.0 - 1e-6 && wait <= 22.0 + 1e-6, "{}", wait);
        }
    }

    #[test]
    fn jitter_without_factor() {
        assert_eq!(Duration::from_secs(5), jitter(Duration::from_secs(5), 0.0));
    }

    #[test]
    fn poll_until_available() {
        let mut service = MemoryMailService::default().header_delay(2);
        let payload = build_message("me@localhost.com", "a@x.com", "Hi", "Hi", None).unwrap();
        let sent = service.send(&payload.raw, None).unwrap();
        let mut sleeper = RecordingSleeper::default();

        let header = HeaderPoll::default().poll(&mut service, &mut sleeper, &sent.id, "Message-ID");

        assert_eq!(Some(service.sent[0].message_id.clone()), header);
        assert_eq!(2, sleeper.waits.len());
        for wait in sleeper.waits {
            let wait = wait.as_secs_f64();
            assert!(wait >= 1.0 - 1e-6 && wait <= 2.0 + 1e-6);
        }
    }

    #[test]
    fn poll_gives_up() {
        let mut service = MemoryMailService::default().header_delay(100);
        let payload = build_message("me@localhost.com", "a@x.com", "Hi", "Hi", None).unwrap();
        let sent = service.send(&payload.raw, None).unwrap();
        let mut sleeper = RecordingSleeper::default();

        let header = HeaderPoll::default().poll(&mut service, &mut sleeper, &sent.id, "Message-ID");

        assert_eq!(None, header);
        assert_eq!(5, sleeper.waits.len());
        // 1 send + 6 lookups
        assert_eq!(7, service.requests);
    }
}
