//! Delivery of engine events into host code.
//!
//! The engine invokes event procedures on a thread of its own, once per event, while a job is
//! running. [`find_items_callback`] is such a procedure: it relays the location of every item a
//! discovery job reports to a [`DiscoverySink`] and makes sure nothing, panics included, unwinds
//! back across the native boundary.

use crate::{
	engine::EventProc,
	error::{describe, Error},
	property::{Handle, PropertyId, PropertyKind},
	record::{Field, FieldSpec},
	sys, Marshaler,
};

use std::{
	ffi::{c_int, c_void},
	fmt,
	panic::{catch_unwind, AssertUnwindSafe},
	ptr,
	sync::{
		atomic::{AtomicUsize, Ordering},
		Mutex, PoisonError,
	},
};

use async_channel as chan;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{error, trace, warn};

const FOUND_ITEM: FieldSpec = FieldSpec::from_static(&[Field::new(
	PropertyId::FOUND_ITEM_LOCATION,
	PropertyKind::String,
)]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
	JobCompleted,
	JobProgress,
	FindItem,
	Other(c_int),
}

impl EventType {
	#[must_use]
	pub const fn as_raw(self) -> sys::VixEventType {
		match self {
			Self::JobCompleted => sys::VIX_EVENTTYPE_JOB_COMPLETED,
			Self::JobProgress => sys::VIX_EVENTTYPE_JOB_PROGRESS,
			Self::FindItem => sys::VIX_EVENTTYPE_FIND_ITEM,
			Self::Other(raw) => raw,
		}
	}
}

impl From<sys::VixEventType> for EventType {
	fn from(raw: sys::VixEventType) -> Self {
		match raw {
			sys::VIX_EVENTTYPE_JOB_COMPLETED => Self::JobCompleted,
			sys::VIX_EVENTTYPE_JOB_PROGRESS => Self::JobProgress,
			sys::VIX_EVENTTYPE_FIND_ITEM => Self::FindItem,
			raw => Self::Other(raw),
		}
	}
}

/// Host code receiving the location of every item a discovery job finds.
///
/// The location is only borrowed for the duration of the call, its native buffer is released
/// right after.
pub struct DiscoverySink {
	deliver: Box<dyn FnMut(&str) + Send>,
}

impl DiscoverySink {
	pub fn from_fn(deliver: impl FnMut(&str) + Send + 'static) -> Self {
		Self {
			deliver: Box::new(deliver),
		}
	}

	/// A sink copying every location into host memory and relaying it through a channel.
	///
	/// The channel closes once the discovery finishes and the sink is dropped.
	#[must_use]
	pub fn channel() -> (Self, chan::Receiver<String>) {
		let (tx, rx) = chan::unbounded();

		let sink = Self::from_fn(move |location| {
			if tx.send_blocking(location.to_owned()).is_err() {
				warn!(%location, "Discovery receiver dropped, discarding found item");
			}
		});

		(sink, rx)
	}
}

impl fmt::Debug for DiscoverySink {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DiscoverySink").finish_non_exhaustive()
	}
}

/// Outcome of a discovery job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
	/// Items handed to the sink.
	pub found: usize,
	/// Found item events whose location failed to decode, or whose delivery panicked.
	pub skipped: usize,
}

/// State registered with the engine as the client data of [`find_items_callback`].
///
/// Must outlive the job it was registered with.
#[derive(Debug)]
pub struct DiscoveryContext {
	marshaler: Marshaler,
	sink: Mutex<DiscoverySink>,
	found: AtomicUsize,
	skipped: AtomicUsize,
}

impl DiscoveryContext {
	#[must_use]
	pub fn new(marshaler: Marshaler, sink: DiscoverySink) -> Self {
		Self {
			marshaler,
			sink: Mutex::new(sink),
			found: AtomicUsize::new(0),
			skipped: AtomicUsize::new(0),
		}
	}

	/// The pointer to hand to the engine alongside [`find_items_callback`].
	#[must_use]
	pub fn as_client_data(&self) -> *mut c_void {
		ptr::from_ref(self).cast_mut().cast()
	}

	#[must_use]
	pub fn report(&self) -> DiscoveryReport {
		DiscoveryReport {
			found: self.found.load(Ordering::Acquire),
			skipped: self.skipped.load(Ordering::Acquire),
		}
	}

	fn deliver(&self, job: Handle, event_type: EventType, event: Handle) {
		if event_type != EventType::FindItem {
			trace!(%job, %event_type, "Ignoring event");
			return;
		}

		let location = match self
			.marshaler
			.read(event, &FOUND_ITEM)
			.and_then(|mut record| record.take_string(PropertyId::FOUND_ITEM_LOCATION))
		{
			Ok(location) => location,
			Err(e) => {
				let text = e.native_code().map_or_else(
					|| e.to_string(),
					|code| describe(&**self.marshaler.engine(), code),
				);
				error!(%job, %event, %text, ?e, "Failed to decode found item");
				self.skipped.fetch_add(1, Ordering::AcqRel);
				return;
			}
		};

		let delivered = {
			let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);

			catch_unwind(AssertUnwindSafe(|| {
				(sink.deliver)(&location.to_string_lossy());
			}))
		};

		// The native buffer goes away here, after the sink returned
		drop(location);

		if delivered.is_ok() {
			self.found.fetch_add(1, Ordering::AcqRel);
		} else {
			error!(%job, %event, "Discovery sink panicked, skipping found item");
			self.skipped.fetch_add(1, Ordering::AcqRel);
		}
	}
}

/// Event procedure of discovery jobs, register it with a [`DiscoveryContext`] as client data.
///
/// Ignores every event but found items.
///
/// # Safety
///
/// `client_data` must be null or point to a live [`DiscoveryContext`].
pub unsafe extern "C" fn find_items_callback(
	job: sys::VixHandle,
	event_type: sys::VixEventType,
	more_event_info: sys::VixHandle,
	client_data: *mut c_void,
) {
	if client_data.is_null() {
		return;
	}

	// SAFETY: the caller guarantees `client_data` is a `DiscoveryContext` that outlives the job
	let context = unsafe { &*client_data.cast::<DiscoveryContext>() };

	if let Err(e) = catch_unwind(AssertUnwindSafe(|| {
		context.deliver(Handle(job), event_type.into(), Handle(more_event_info));
	})) {
		error!(job, ?e, "Panic while handling a discovery event");
	}
}

impl Marshaler {
	/// Runs a discovery job, relaying every found item to `sink` while it runs.
	///
	/// `start` receives the event procedure and its client data and must create the job with
	/// them, returning its handle. The client data stays valid until the job completed.
	pub fn discover<F>(&self, start: F, sink: DiscoverySink) -> Result<DiscoveryReport, Error>
	where
		F: FnOnce(EventProc, *mut c_void) -> Handle,
	{
		let context = Box::new(DiscoveryContext::new(self.clone(), sink));

		let job = start(find_items_callback, context.as_client_data());

		self.wait(job, &FieldSpec::new())?;

		let report = context.report();
		if report.skipped > 0 {
			warn!(%job, ?report, "Discovery completed with skipped items");
		}

		Ok(report)
	}
}
