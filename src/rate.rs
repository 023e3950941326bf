//! Sliding-window admission control over a single shared request budget.
//!
//! The governor throttles but never rejects: [`RateGovernor::admit`] suspends
//! the caller until a slot opens, so outbound rate stays bounded without
//! dropping work. Timestamps use [`tokio::time::Instant`], which cooperates
//! with the paused test clock.

// std
use std::{collections::VecDeque, time::Duration};
// crates.io
use tokio::time::{self, Instant};
// self
use crate::_prelude::*;

/// Budget definition for the sliding window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitOptions {
	/// Maximum admissions inside one trailing window.
	pub max_requests: usize,
	/// Length of the trailing window.
	pub window: Duration,
}
impl RateLimitOptions {
	/// Creates a budget of `max_requests` admissions per `window`.
	pub fn new(max_requests: usize, window: Duration) -> Self {
		Self { max_requests, window }
	}
}
impl Default for RateLimitOptions {
	// The osu! API guideline is sixty requests per minute.
	fn default() -> Self {
		Self { max_requests: 60, window: Duration::from_secs(60) }
	}
}

/// Read-only projection of the current window state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateStatus {
	/// Admissions still available inside the current window.
	pub remaining: usize,
	/// Time until the oldest tracked admission leaves the window.
	pub reset_in: Duration,
	/// Configured budget size.
	pub total: usize,
}

/// Sliding-window admission controller shared by every outbound request.
///
/// Entries older than the window are lazily evicted from the front of the
/// deque on every check; the deque is ordered, so eviction is O(1) amortized.
#[derive(Debug)]
pub struct RateGovernor {
	options: RateLimitOptions,
	admitted: Mutex<VecDeque<Instant>>,
}
impl RateGovernor {
	/// Creates a governor for the provided budget.
	///
	/// A zero-request budget would block forever, so it is clamped to one.
	pub fn new(options: RateLimitOptions) -> Self {
		let options = RateLimitOptions {
			max_requests: options.max_requests.max(1),
			window: options.window,
		};

		Self { options, admitted: Mutex::new(VecDeque::new()) }
	}

	/// Waits until the window has a free slot, then records the admission.
	///
	/// Admission always eventually succeeds. The wait is a timer suspension
	/// sized to when the oldest tracked admission exits the window, never a
	/// busy poll. The window state is re-checked after waking because another
	/// caller may have claimed the freed slot first; no fairness is guaranteed
	/// among waiters.
	pub async fn admit(&self) {
		loop {
			let wait = {
				let mut admitted = self.admitted.lock();
				let now = Instant::now();

				Self::evict(&mut admitted, now, self.options.window);

				match admitted.front() {
					// At capacity; the front is the oldest admission still
					// inside the window.
					Some(oldest) if admitted.len() >= self.options.max_requests =>
						self.options.window.saturating_sub(now.duration_since(*oldest)),
					_ => {
						admitted.push_back(now);

						return;
					},
				}
			};

			time::sleep(wait).await;
		}
	}

	/// Reports the window state without consuming an admission.
	///
	/// Stale entries are evicted, but nothing is recorded; the projection is
	/// for observability, not gating.
	pub fn status(&self) -> RateStatus {
		let mut admitted = self.admitted.lock();
		let now = Instant::now();

		Self::evict(&mut admitted, now, self.options.window);

		let remaining = self.options.max_requests.saturating_sub(admitted.len());
		let reset_in = admitted
			.front()
			.map(|oldest| self.options.window.saturating_sub(now.duration_since(*oldest)))
			.unwrap_or(Duration::ZERO);

		RateStatus { remaining, reset_in, total: self.options.max_requests }
	}

	fn evict(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
		while let Some(oldest) = admitted.front() {
			if now.duration_since(*oldest) < window {
				break;
			}

			admitted.pop_front();
		}
	}
}
