use crate::{
	engine::{Engine, RawOut, RawSlot},
	error::Error,
	property::{Handle, PropertyId, PropertyKind},
	record::{Field, FieldSpec, ResultRecord},
	value::{NativeBlob, NativeString, Value},
	Marshaler,
};

use std::sync::Arc;

use tracing::trace;

/// One empty output slot per requested field, in request order.
pub(crate) fn slots_for(spec: &FieldSpec) -> Vec<RawSlot> {
	spec.iter()
		.map(|field| RawSlot::new(field.id, field.kind))
		.collect()
}

/// Takes ownership of whatever the engine wrote into `slot`.
pub(crate) fn into_value(engine: &Arc<dyn Engine>, slot: RawSlot) -> Value {
	match slot.out {
		RawOut::Int(value) => Value::Int(value),
		RawOut::Int64(value) => Value::Int64(value),
		RawOut::Bool(value) => Value::Bool(value != 0),
		RawOut::Handle(value) => Value::Handle(Handle(value)),
		// SAFETY: the engine filled this slot and nobody else took the buffer out of it
		RawOut::String(ptr) => {
			Value::String(unsafe { NativeString::from_raw(ptr, Arc::clone(engine)) })
		}
		// SAFETY: same as above, a negative length never comes with readable bytes
		RawOut::Blob { len, data } => Value::Blob(unsafe {
			NativeBlob::from_raw(
				data,
				usize::try_from(len).unwrap_or_default(),
				Arc::clone(engine),
			)
		}),
	}
}

pub(crate) fn into_record(
	engine: &Arc<dyn Engine>,
	handle: Handle,
	slots: Vec<RawSlot>,
) -> ResultRecord {
	ResultRecord::with_entries(
		handle,
		slots
			.into_iter()
			.map(|slot| (slot.id, into_value(engine, slot)))
			.collect(),
	)
}

impl Marshaler {
	/// Reads a single property from `handle`, failing unless it holds `expected`.
	pub fn decode(
		&self,
		handle: Handle,
		id: PropertyId,
		expected: PropertyKind,
	) -> Result<Value, Error> {
		let spec = FieldSpec::new().field(id, expected);

		self.read(handle, &spec)?.take(id).ok_or_else(|| {
			Error::invalid_request(handle, format!("property <id='{id}'> was not decoded"))
		})
	}

	/// Reads every field of `spec` from `handle` in a single native request.
	///
	/// `handle` must already be complete, nothing here waits.
	pub fn read(&self, handle: Handle, spec: &FieldSpec) -> Result<ResultRecord, Error> {
		spec.validate(self.catalogue(), handle)?;

		self.read_unchecked(handle, spec)
	}

	/// Same as [`Marshaler::read`], for specs already validated against the catalogue.
	pub(crate) fn read_unchecked(
		&self,
		handle: Handle,
		spec: &FieldSpec,
	) -> Result<ResultRecord, Error> {
		if spec.is_empty() {
			return Ok(ResultRecord::new(handle));
		}

		let engine = self.engine();

		for &Field { id, kind } in spec.iter() {
			let actual = engine.property_kind(handle, id).map_err(|code| {
				Error::from_native(&**engine, code, handle, Some(Field::new(id, kind)), None)
			})?;

			if actual != kind {
				return Err(Error::TypeMismatch {
					handle,
					id,
					expected: kind,
					actual: Some(actual),
				});
			}
		}

		let mut slots = slots_for(spec);

		engine
			.get_properties(handle, &mut slots)
			.map_err(|failure| Error::from_failure(&**engine, failure, handle, spec, None))?;

		trace!(%handle, fields = spec.len(), "Decoded properties");

		Ok(into_record(engine, handle, slots))
	}
}
