use crate::{
	codec::{into_record, slots_for},
	error::Error,
	property::{Handle, PropertyId},
	record::{FieldSpec, ResultRecord},
	Marshaler,
};

use std::{ffi::c_int, iter::FusedIterator};

use tracing::{instrument, trace};

impl Marshaler {
	/// How many records of a completed `job` carry `id`.
	pub fn count(&self, job: Handle, id: PropertyId) -> Result<usize, Error> {
		if self.catalogue().kind(id).is_none() {
			return Err(Error::NotFound {
				handle: job,
				id,
				code: None,
			});
		}

		Ok(usize::try_from(self.engine().num_properties(job, id)).unwrap_or_default())
	}

	/// Decodes the record at `index` of a completed multi-record `job`.
	///
	/// The valid range is given by the [`count`](Marshaler::count) of the spec's first field.
	#[instrument(skip(self, spec), fields(fields = spec.len()), err)]
	pub fn decode_at(
		&self,
		job: Handle,
		index: i64,
		spec: &FieldSpec,
	) -> Result<ResultRecord, Error> {
		spec.validate(self.catalogue(), job)?;

		let first = spec.first().ok_or_else(|| {
			Error::invalid_request(job, "an indexed decode needs at least one field")
		})?;

		let count = self.count(job, first.id)?;
		let position = usize::try_from(index)
			.ok()
			.filter(|&position| position < count)
			.and_then(|position| c_int::try_from(position).ok())
			.ok_or(Error::IndexOutOfRange {
				handle: job,
				index,
				count,
			})?;

		let engine = self.engine();
		let mut slots = slots_for(spec);

		engine
			.get_nth_properties(job, position, &mut slots)
			.map_err(|failure| Error::from_failure(&**engine, failure, job, spec, Some(index)))?;

		trace!(%job, index, "Decoded record");

		Ok(into_record(engine, job, slots))
	}

	/// Iterates over every record of a completed multi-record `job`, one
	/// [`decode_at`](Marshaler::decode_at) per step.
	pub fn records<'a>(&'a self, job: Handle, spec: &'a FieldSpec) -> Result<Records<'a>, Error> {
		let first = spec.first().ok_or_else(|| {
			Error::invalid_request(job, "an indexed decode needs at least one field")
		})?;

		Ok(Records {
			marshaler: self,
			job,
			spec,
			next: 0,
			count: self.count(job, first.id)?,
		})
	}
}

/// Iterator returned by [`Marshaler::records`].
#[derive(Debug)]
pub struct Records<'a> {
	marshaler: &'a Marshaler,
	job: Handle,
	spec: &'a FieldSpec,
	next: usize,
	count: usize,
}

impl Iterator for Records<'_> {
	type Item = Result<ResultRecord, Error>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.next >= self.count {
			return None;
		}

		let index = i64::try_from(self.next).unwrap_or(i64::MAX);
		self.next += 1;

		Some(self.marshaler.decode_at(self.job, index, self.spec))
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = self.count - self.next;
		(remaining, Some(remaining))
	}
}

impl ExactSizeIterator for Records<'_> {}

impl FusedIterator for Records<'_> {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		engine::{memory::MemoryValue, Engine, MemoryEngine},
		error::ErrorKind,
		property::PropertyKind,
	};

	use std::sync::Arc;

	fn processes(engine: &MemoryEngine) -> Handle {
		engine
			.job()
			.record([
				(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("init")),
				(PropertyId::JOB_RESULT_PROCESS_ID, MemoryValue::from(1i64)),
			])
			.record([
				(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("sshd")),
				(PropertyId::JOB_RESULT_PROCESS_ID, MemoryValue::from(812i64)),
			])
			.finish()
	}

	fn spec() -> FieldSpec {
		FieldSpec::new()
			.field(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String)
			.field(PropertyId::JOB_RESULT_PROCESS_ID, PropertyKind::Int64)
	}

	#[test]
	fn bounds_are_checked_before_the_engine() {
		let engine = Arc::new(MemoryEngine::new());
		let marshaler = Marshaler::new(Arc::clone(&engine) as Arc<dyn Engine>);
		let job = processes(&engine);

		assert_eq!(marshaler.count(job, PropertyId::JOB_RESULT_ITEM_NAME).unwrap(), 2);

		for index in [-1, 2, i64::MAX] {
			assert!(matches!(
				marshaler.decode_at(job, index, &spec()),
				Err(Error::IndexOutOfRange { count: 2, .. })
			));
		}

		let record = marshaler.decode_at(job, 1, &spec()).unwrap();
		assert_eq!(record.string(PropertyId::JOB_RESULT_ITEM_NAME).unwrap(), "sshd");
		assert_eq!(record.int64(PropertyId::JOB_RESULT_PROCESS_ID).unwrap(), 812);
	}

	#[test]
	fn empty_specs_are_rejected() {
		let engine = Arc::new(MemoryEngine::new());
		let marshaler = Marshaler::new(Arc::clone(&engine) as Arc<dyn Engine>);
		let job = processes(&engine);

		assert_eq!(
			marshaler
				.decode_at(job, 0, &FieldSpec::new())
				.map_err(|e| e.kind()),
			Err(ErrorKind::InvalidRequest)
		);
		assert!(marshaler.records(job, &FieldSpec::new()).is_err());
	}

	#[test]
	fn records_walk_every_index() {
		let engine = Arc::new(MemoryEngine::new());
		let marshaler = Marshaler::new(Arc::clone(&engine) as Arc<dyn Engine>);
		let job = processes(&engine);
		let spec = spec();

		let records = marshaler.records(job, &spec).unwrap();
		assert_eq!(records.len(), 2);

		let names = records
			.map(|record| record.and_then(|record| record.string(PropertyId::JOB_RESULT_ITEM_NAME)))
			.collect::<Result<Vec<_>, _>>()
			.unwrap();

		assert_eq!(names, ["init", "sshd"]);
		assert_eq!(engine.live_buffers(), 0);
	}
}
