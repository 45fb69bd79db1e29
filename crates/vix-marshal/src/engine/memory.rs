//! An [`Engine`] living entirely in process memory.
//!
//! Strings and blobs are handed out in `malloc` allocated buffers, as the native library does,
//! and every buffer is tracked until it is released so leaks and double frees can be asserted
//! on. Events registered on a job are fired from a separate thread while the job is waited on.

use super::{Engine, EventProc, Failure, RawOut, RawSlot};
use crate::{
	error::NativeCode,
	event::EventType,
	property::{Handle, PropertyId, PropertyKind},
	sys,
};

use std::{
	collections::{HashMap, HashSet},
	ffi::{c_char, c_int, c_void},
	ptr,
	sync::{Mutex, MutexGuard, PoisonError},
	thread,
	time::Duration,
};

use tracing::{trace, warn};

/// A property value stored by the [`MemoryEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryValue {
	Int(i32),
	Int64(i64),
	Bool(bool),
	String(String),
	Blob(Vec<u8>),
	Handle(Handle),
}

impl MemoryValue {
	#[must_use]
	pub const fn kind(&self) -> PropertyKind {
		match self {
			Self::Int(_) => PropertyKind::Int,
			Self::Int64(_) => PropertyKind::Int64,
			Self::Bool(_) => PropertyKind::Bool,
			Self::String(_) => PropertyKind::String,
			Self::Blob(_) => PropertyKind::Blob,
			Self::Handle(_) => PropertyKind::Handle,
		}
	}
}

impl From<i32> for MemoryValue {
	fn from(value: i32) -> Self {
		Self::Int(value)
	}
}

impl From<i64> for MemoryValue {
	fn from(value: i64) -> Self {
		Self::Int64(value)
	}
}

impl From<bool> for MemoryValue {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<&str> for MemoryValue {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for MemoryValue {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<Vec<u8>> for MemoryValue {
	fn from(value: Vec<u8>) -> Self {
		Self::Blob(value)
	}
}

impl From<Handle> for MemoryValue {
	fn from(value: Handle) -> Self {
		Self::Handle(value)
	}
}

type Properties = HashMap<PropertyId, MemoryValue>;

/// An event fired while a job is waited on, with the property bag of its event handle.
#[derive(Debug, Clone)]
pub struct MemoryEvent {
	event_type: EventType,
	properties: Properties,
}

impl MemoryEvent {
	#[must_use]
	pub fn new(event_type: EventType) -> Self {
		Self {
			event_type,
			properties: Properties::new(),
		}
	}

	/// A found item event reporting `location`.
	#[must_use]
	pub fn found(location: impl Into<String>) -> Self {
		Self::new(EventType::FindItem).property(
			PropertyId::FOUND_ITEM_LOCATION,
			MemoryValue::String(location.into()),
		)
	}

	#[must_use]
	pub fn progress() -> Self {
		Self::new(EventType::JobProgress)
	}

	#[must_use]
	pub fn property(mut self, id: PropertyId, value: impl Into<MemoryValue>) -> Self {
		self.properties.insert(id, value.into());
		self
	}
}

// Raw client data pointer registered along an event procedure, only ever dereferenced by it.
#[derive(Debug, Clone, Copy)]
struct ClientData(*mut c_void);

// SAFETY: whoever registers the pointer guarantees it stays valid, and usable from the thread
// events are fired on, until the job completes.
unsafe impl Send for ClientData {}

impl ClientData {
	const fn get(self) -> *mut c_void {
		self.0
	}
}

#[derive(Debug, Default)]
struct Object {
	properties: Properties,
	records: Vec<Properties>,
	status: NativeCode,
	delay: Duration,
	events: Vec<(EventType, Handle)>,
	callback: Option<(EventProc, ClientData)>,
	waits: usize,
}

#[derive(Debug)]
struct State {
	objects: HashMap<Handle, Object>,
	live: HashSet<usize>,
	double_frees: usize,
	next_handle: c_int,
}

impl State {
	fn insert(&mut self, object: Object) -> Handle {
		let handle = Handle(self.next_handle);
		self.next_handle += 1;
		self.objects.insert(handle, object);
		handle
	}

	fn object(&self, handle: Handle) -> Result<&Object, NativeCode> {
		self.objects
			.get(&handle)
			.ok_or(NativeCode(sys::VIX_E_INVALID_HANDLE))
	}

	fn alloc(&mut self, bytes: &[u8], nul_terminated: bool) -> Result<*mut c_void, NativeCode> {
		let size = bytes.len() + usize::from(nul_terminated);

		// SAFETY: plain allocation, `size` is never zero for strings and clamped for blobs
		let buffer = unsafe { libc::malloc(size.max(1)) };
		if buffer.is_null() {
			return Err(NativeCode(sys::VIX_E_OUT_OF_MEMORY));
		}

		// SAFETY: `buffer` holds at least `size` bytes and doesn't overlap `bytes`
		unsafe {
			ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), bytes.len());
			if nul_terminated {
				buffer.cast::<u8>().add(bytes.len()).write(0);
			}
		}

		self.live.insert(buffer as usize);

		Ok(buffer)
	}

	fn release(&mut self, buffer: *mut c_void) {
		if self.live.remove(&(buffer as usize)) {
			// SAFETY: tracked buffers come from `alloc` and leave the set on release
			unsafe { libc::free(buffer) };
		} else {
			warn!(?buffer, "Released a buffer that isn't live");
			self.double_frees += 1;
		}
	}

	fn write(&mut self, value: &MemoryValue, out: &mut RawOut) -> Result<(), NativeCode> {
		*out = match value {
			MemoryValue::Int(value) => RawOut::Int(*value),
			MemoryValue::Int64(value) => RawOut::Int64(*value),
			MemoryValue::Bool(value) => RawOut::Bool(c_char::from(*value)),
			MemoryValue::Handle(value) => RawOut::Handle(value.0),
			MemoryValue::String(value) => {
				// Like C, the string ends at its first NUL
				let bytes = value.split('\0').next().unwrap_or_default().as_bytes();
				RawOut::String(self.alloc(bytes, true)?.cast())
			}
			MemoryValue::Blob(value) => {
				let len = c_int::try_from(value.len())
					.map_err(|_| NativeCode(sys::VIX_E_INVALID_ARG))?;
				RawOut::Blob {
					len,
					data: self.alloc(value, false)?.cast(),
				}
			}
		};

		Ok(())
	}

	/// Fills every slot from `properties`, or none of them.
	fn fill(&mut self, properties: &Properties, slots: &mut [RawSlot]) -> Result<(), Failure> {
		for position in 0..slots.len() {
			let slot = &mut slots[position];

			let res = match properties.get(&slot.id) {
				None => Err(NativeCode(sys::VIX_E_UNRECOGNIZED_PROPERTY)),
				Some(value) if value.kind() != slot.kind() => {
					Err(NativeCode(sys::VIX_E_TYPE_MISMATCH))
				}
				Some(value) => self.write(value, &mut slot.out),
			};

			if let Err(code) = res {
				for filled in &mut slots[..position] {
					if let Some(buffer) = filled.out.take_buffer() {
						self.release(buffer);
					}
				}

				return Err(Failure::at(code, position));
			}
		}

		Ok(())
	}
}

/// Fully functional in-memory [`Engine`].
#[derive(Debug)]
pub struct MemoryEngine {
	state: Mutex<State>,
}

impl Default for MemoryEngine {
	fn default() -> Self {
		Self {
			state: Mutex::new(State {
				objects: HashMap::new(),
				live: HashSet::new(),
				double_frees: 0,
				next_handle: 1,
			}),
		}
	}
}

impl MemoryEngine {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Registers a plain object, a VM or host, holding `properties`.
	pub fn handle_with(
		&self,
		properties: impl IntoIterator<Item = (PropertyId, MemoryValue)>,
	) -> Handle {
		self.state().insert(Object {
			properties: properties.into_iter().collect(),
			..Default::default()
		})
	}

	/// Starts describing a job, see [`JobBuilder`].
	#[must_use]
	pub fn job(&self) -> JobBuilder<'_> {
		JobBuilder {
			engine: self,
			job: Object::default(),
			events: Vec::new(),
		}
	}

	/// Registers the event procedure of an existing job, as the native calls creating a job do.
	pub fn attach(&self, job: Handle, proc: EventProc, client_data: *mut c_void) {
		if let Some(object) = self.state().objects.get_mut(&job) {
			object.callback = Some((proc, ClientData(client_data)));
		}
	}

	/// Number of buffers handed out and not released yet.
	#[must_use]
	pub fn live_buffers(&self) -> usize {
		self.state().live.len()
	}

	/// Number of times a buffer was released that wasn't live.
	#[must_use]
	pub fn double_frees(&self) -> usize {
		self.state().double_frees
	}

	/// Number of times `job` was waited on.
	#[must_use]
	pub fn waits(&self, job: Handle) -> usize {
		self.state()
			.objects
			.get(&job)
			.map_or(0, |object| object.waits)
	}
}

impl Engine for MemoryEngine {
	fn wait(&self, job: Handle) -> NativeCode {
		let (status, delay, events, callback) = {
			let mut state = self.state();
			let Some(object) = state.objects.get_mut(&job) else {
				return NativeCode(sys::VIX_E_INVALID_HANDLE);
			};

			object.waits += 1;

			(
				object.status,
				object.delay,
				// Events fire once, on the first wait
				std::mem::take(&mut object.events),
				object.callback,
			)
		};

		if !delay.is_zero() {
			thread::sleep(delay);
		}

		if let Some((proc, client_data)) = callback {
			trace!(%job, events = events.len(), "Firing events");

			thread::scope(|s| {
				s.spawn(move || {
					for (event_type, event) in events {
						// SAFETY: `attach` callers guarantee the client data outlives the job
						unsafe { proc(job.0, event_type.as_raw(), event.0, client_data.get()) };
					}
				});
			});
		}

		status
	}

	fn property_kind(&self, handle: Handle, id: PropertyId) -> Result<PropertyKind, NativeCode> {
		self.state()
			.object(handle)?
			.properties
			.get(&id)
			.map(MemoryValue::kind)
			.ok_or(NativeCode(sys::VIX_E_UNRECOGNIZED_PROPERTY))
	}

	fn get_properties(&self, handle: Handle, slots: &mut [RawSlot]) -> Result<(), Failure> {
		let mut state = self.state();
		let properties = state.object(handle).map_err(Failure::new)?.properties.clone();

		state.fill(&properties, slots)
	}

	fn get_nth_properties(
		&self,
		job: Handle,
		index: c_int,
		slots: &mut [RawSlot],
	) -> Result<(), Failure> {
		let mut state = self.state();
		let properties = usize::try_from(index)
			.ok()
			.and_then(|index| {
				state
					.object(job)
					.map(|object| object.records.get(index).cloned())
					.transpose()
			})
			.unwrap_or(Err(NativeCode(sys::VIX_E_INVALID_ARG)))
			.map_err(Failure::new)?;

		state.fill(&properties, slots)
	}

	fn num_properties(&self, job: Handle, id: PropertyId) -> c_int {
		let count = self.state().object(job).map_or(0, |object| {
			object
				.records
				.iter()
				.filter(|record| record.contains_key(&id))
				.count()
		});

		c_int::try_from(count).unwrap_or(c_int::MAX)
	}

	unsafe fn free_buffer(&self, buffer: *mut c_void) {
		if !buffer.is_null() {
			self.state().release(buffer);
		}
	}

	fn error_text(&self, code: NativeCode) -> Option<String> {
		let text = match sys::VixError::from(code.code()) {
			sys::VIX_OK => "The operation was successfully completed",
			sys::VIX_E_FAIL => "Unknown error",
			sys::VIX_E_OUT_OF_MEMORY => "Memory allocation failed: out of memory",
			sys::VIX_E_INVALID_ARG => "One of the parameters was invalid",
			sys::VIX_E_FILE_NOT_FOUND => "A file was not found",
			sys::VIX_E_OBJECT_IS_BUSY => "The handle is busy executing another function",
			sys::VIX_E_NOT_SUPPORTED => "The operation is not supported",
			sys::VIX_E_CANCELLED => "The operation was canceled",
			sys::VIX_E_UNFINISHED_JOB => "The job has not finished",
			sys::VIX_E_HOST_CONNECTION_LOST => "The connection to the host was lost",
			sys::VIX_E_INVALID_HANDLE => "The handle is not a valid VIX object",
			sys::VIX_E_NOT_SUPPORTED_ON_HANDLE_TYPE => {
				"The operation is not supported on this type of handle"
			}
			sys::VIX_E_NOT_FOUND => "The object was not found",
			sys::VIX_E_TYPE_MISMATCH => "The value has the wrong type",
			sys::VIX_E_VM_NOT_RUNNING => "The virtual machine needs to be powered on",
			sys::VIX_E_UNRECOGNIZED_PROPERTY => "Unrecognized handle property identifier",
			sys::VIX_E_INVALID_PROPERTY_VALUE => "Invalid property value",
			sys::VIX_E_PROPERTY_TYPE_MISMATCH => "Incorrect property type",
			_ => return None,
		};

		Some(text.to_string())
	}
}

impl Drop for MemoryEngine {
	fn drop(&mut self) {
		let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);

		for buffer in state.live.drain() {
			// SAFETY: every live buffer came from `malloc` and was never freed
			unsafe { libc::free(buffer as *mut c_void) };
		}
	}
}

/// Describes a job of a [`MemoryEngine`], finished with [`JobBuilder::finish`].
#[derive(Debug)]
pub struct JobBuilder<'a> {
	engine: &'a MemoryEngine,
	job: Object,
	events: Vec<MemoryEvent>,
}

impl JobBuilder<'_> {
	/// A property of the job's own bag, read by waits.
	#[must_use]
	pub fn property(mut self, id: PropertyId, value: impl Into<MemoryValue>) -> Self {
		self.job.properties.insert(id, value.into());
		self
	}

	/// Appends a record to the job's indexed result set.
	#[must_use]
	pub fn record(mut self, properties: impl IntoIterator<Item = (PropertyId, MemoryValue)>) -> Self {
		self.job.records.push(properties.into_iter().collect());
		self
	}

	/// Status reported when the job completes, [`NativeCode::OK`] by default.
	#[must_use]
	pub const fn status(mut self, status: NativeCode) -> Self {
		self.job.status = status;
		self
	}

	#[must_use]
	pub fn event(mut self, event: MemoryEvent) -> Self {
		self.events.push(event);
		self
	}

	/// Registers the event procedure right away, see [`MemoryEngine::attach`].
	#[must_use]
	pub fn callback(mut self, proc: EventProc, client_data: *mut c_void) -> Self {
		self.job.callback = Some((proc, ClientData(client_data)));
		self
	}

	/// How long waits on the job block before it completes.
	#[must_use]
	pub const fn delay(mut self, delay: Duration) -> Self {
		self.job.delay = delay;
		self
	}

	pub fn finish(self) -> Handle {
		let Self {
			engine,
			mut job,
			events,
		} = self;

		let mut state = engine.state();

		job.events = events
			.into_iter()
			.map(|event| {
				let handle = state.insert(Object {
					properties: event.properties,
					..Default::default()
				});

				(event.event_type, handle)
			})
			.collect();

		state.insert(job)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn failed_requests_release_what_they_produced() {
		let engine = MemoryEngine::new();
		let handle = engine.handle_with([
			(PropertyId::VM_NAME, MemoryValue::from("ubuntu")),
			(PropertyId::VM_NUM_VCPUS, MemoryValue::from(2i32)),
		]);

		let mut slots = [
			RawSlot::new(PropertyId::VM_NAME, PropertyKind::String),
			RawSlot::new(PropertyId::VM_NUM_VCPUS, PropertyKind::Int64),
		];

		assert_eq!(
			engine.get_properties(handle, &mut slots),
			Err(Failure::at(NativeCode(sys::VIX_E_TYPE_MISMATCH), 1))
		);
		assert_eq!(engine.live_buffers(), 0);
		assert!(matches!(slots[0].out, RawOut::String(ptr) if ptr.is_null()));
	}

	#[test]
	fn buffers_are_tracked_until_released() {
		let engine = MemoryEngine::new();
		let handle = engine.handle_with([(
			PropertyId::JOB_RESULT_SCREEN_IMAGE_DATA,
			MemoryValue::from(vec![0x89, b'P', b'N', b'G']),
		)]);

		let mut slots = [RawSlot::new(
			PropertyId::JOB_RESULT_SCREEN_IMAGE_DATA,
			PropertyKind::Blob,
		)];
		engine.get_properties(handle, &mut slots).unwrap();

		assert!(matches!(slots[0].out, RawOut::Blob { len: 4, .. }));
		assert_eq!(engine.live_buffers(), 1);

		let buffer = slots[0].out.take_buffer().unwrap();
		unsafe {
			engine.free_buffer(buffer);
			engine.free_buffer(buffer);
		}

		assert_eq!(engine.live_buffers(), 0);
		assert_eq!(engine.double_frees(), 1);
	}

	#[test]
	fn indexed_reads() {
		let engine = MemoryEngine::new();
		let job = engine
			.job()
			.record([(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("a"))])
			.record([(PropertyId::JOB_RESULT_FILE_SIZE, MemoryValue::from(1i64))])
			.finish();

		assert_eq!(engine.num_properties(job, PropertyId::JOB_RESULT_ITEM_NAME), 1);
		assert_eq!(engine.num_properties(Handle(999), PropertyId::JOB_RESULT_ITEM_NAME), 0);

		let mut slots = [RawSlot::new(PropertyId::JOB_RESULT_FILE_SIZE, PropertyKind::Int64)];
		engine.get_nth_properties(job, 1, &mut slots).unwrap();
		assert!(matches!(slots[0].out, RawOut::Int64(1)));

		assert_eq!(
			engine.get_nth_properties(job, 2, &mut slots),
			Err(Failure::new(NativeCode(sys::VIX_E_INVALID_ARG)))
		);
		assert_eq!(
			engine.get_nth_properties(Handle(999), 0, &mut slots),
			Err(Failure::new(NativeCode(sys::VIX_E_INVALID_HANDLE)))
		);
	}

	#[test]
	fn strings_end_at_their_first_nul() {
		let engine = MemoryEngine::new();
		let handle = engine.handle_with([(PropertyId::VM_NAME, MemoryValue::from("ab\0cd"))]);

		let mut slots = [RawSlot::new(PropertyId::VM_NAME, PropertyKind::String)];
		engine.get_properties(handle, &mut slots).unwrap();

		let RawOut::String(ptr) = slots[0].out else {
			panic!("expected a string");
		};
		assert_eq!(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_bytes(), b"ab");

		unsafe { engine.free_buffer(ptr.cast()) };
	}
}
