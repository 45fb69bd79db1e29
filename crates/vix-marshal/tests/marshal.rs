use vix_marshal::{
	memory::{MemoryEvent, MemoryValue},
	model::{FILE_LISTING, PROCESS_LISTING, PROGRAM_OUTPUT, SCREENSHOT},
	DiscoveryReport, DiscoverySink, Engine, Error, ErrorKind, EventType, FieldSpec, GuestFile,
	GuestProcess, Handle, Marshaler, NativeCode, ProgramOutput, PropertyId, PropertyKind,
	Screenshot,
};

use std::{sync::Arc, thread, time::Duration};

use tracing::info;
use tracing_test::traced_test;

mod common;

use common::{file_listing, setup, FIVE_FILES};

#[test]
#[traced_test]
fn five_file_listing() {
	let (engine, marshaler) = setup();
	let job = file_listing(&engine, &FIVE_FILES);

	marshaler.wait(job, &FieldSpec::new()).unwrap();

	assert_eq!(marshaler.count(job, PropertyId::JOB_RESULT_ITEM_NAME).unwrap(), 5);

	let record = marshaler.decode_at(job, 2, &FILE_LISTING).unwrap();
	assert_eq!(
		record.ids().collect::<Vec<_>>(),
		FILE_LISTING.iter().map(|field| field.id).collect::<Vec<_>>()
	);

	let file = GuestFile::try_from(record).unwrap();
	assert_eq!(file.name, "pagefile.sys");
	assert_eq!(file.size, 4096);
	assert_eq!(file.flags, 1);
	assert_eq!(file.modified, 1_700_000_000);
	assert!(file.is_dir());

	assert!(matches!(
		marshaler.decode_at(job, 5, &FILE_LISTING),
		Err(Error::IndexOutOfRange {
			index: 5,
			count: 5,
			..
		})
	));

	let symlink = GuestFile::try_from(marshaler.decode_at(job, 4, &FILE_LISTING).unwrap()).unwrap();
	assert!(symlink.is_symlink());
	assert!(!symlink.is_dir());

	assert_eq!(engine.live_buffers(), 0);
	assert_eq!(engine.double_frees(), 0);
}

#[test]
#[traced_test]
fn indexed_decodes_cover_exactly_the_count() {
	let (engine, marshaler) = setup();
	let job = file_listing(&engine, &FIVE_FILES);

	marshaler.wait(job, &FieldSpec::new()).unwrap();

	let names = (0..5)
		.map(|index| {
			marshaler
				.decode_at(job, index, &FILE_LISTING)
				.and_then(GuestFile::try_from)
				.map(|file| file.name)
		})
		.collect::<Result<Vec<_>, _>>()
		.unwrap();

	assert_eq!(
		names,
		FIVE_FILES.iter().map(|(name, ..)| *name).collect::<Vec<_>>()
	);

	for index in [-1, 5] {
		assert_eq!(
			marshaler
				.decode_at(job, index, &FILE_LISTING)
				.map_err(|e| e.kind()),
			Err(ErrorKind::IndexOutOfRange)
		);
	}

	let listed = marshaler
		.records(job, &FILE_LISTING)
		.unwrap()
		.map(|record| record.and_then(GuestFile::try_from))
		.collect::<Result<Vec<_>, _>>()
		.unwrap();
	assert_eq!(listed.len(), 5);
	assert_eq!(listed[3].size, 12);

	assert_eq!(engine.live_buffers(), 0);
}

#[test]
#[traced_test]
fn kinds_are_never_coerced() {
	let custom = PropertyId(9300);
	let (engine, _) = setup();
	let marshaler = Marshaler::builder()
		.declare(custom, PropertyKind::Int)
		.build(Arc::clone(&engine) as Arc<dyn Engine>);

	let job = engine
		.job()
		.property(PropertyId::JOB_RESULT_FILE_SIZE, 1i64)
		.property(custom, 1i64)
		.finish();

	let error = marshaler
		.wait(
			job,
			&FieldSpec::new().field(PropertyId::JOB_RESULT_FILE_SIZE, PropertyKind::Int),
		)
		.unwrap_err();
	assert_eq!(error.kind(), ErrorKind::TypeMismatch);

	let error = marshaler
		.wait(job, &FieldSpec::new().field(custom, PropertyKind::Int))
		.unwrap_err();
	assert!(matches!(
		error,
		Error::TypeMismatch {
			expected: PropertyKind::Int,
			actual: Some(PropertyKind::Int64),
			..
		}
	));

	assert_eq!(engine.live_buffers(), 0);
}

#[test]
#[traced_test]
fn waits_are_idempotent() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.property(PropertyId::JOB_RESULT_PROCESS_ID, 4242i64)
		.property(PropertyId::JOB_RESULT_GUEST_PROGRAM_ELAPSED_TIME, 3i32)
		.property(PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE, 1i32)
		.property(PropertyId::JOB_RESULT_ITEM_NAME, "cmd.exe")
		.finish();

	let spec = PROGRAM_OUTPUT.field(PropertyId::JOB_RESULT_ITEM_NAME, PropertyKind::String);

	let first = marshaler.wait(job, &spec).unwrap();
	let second = marshaler.wait(job, &spec).unwrap();

	assert_eq!(first, second);
	assert_eq!(engine.waits(job), 2);
	assert_eq!(engine.live_buffers(), 2);

	drop((first, second));
	assert_eq!(engine.live_buffers(), 0);

	let output = ProgramOutput::try_from(marshaler.wait(job, &PROGRAM_OUTPUT).unwrap()).unwrap();
	assert_eq!(
		output,
		ProgramOutput {
			pid: 4242,
			elapsed_time: 3,
			exit_code: 1,
		}
	);
}

#[test]
#[traced_test]
fn failed_jobs_carry_their_code_and_text() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.status(NativeCode(3006 | (7 << 32)))
		.finish();

	let error = marshaler.wait(job, &PROGRAM_OUTPUT).unwrap_err();

	assert_eq!(error.kind(), ErrorKind::JobFailed);
	assert_eq!(error.native_code().map(NativeCode::code), Some(3006));
	assert_eq!(
		error.to_string(),
		format!("job <handle='{job}'> failed: The virtual machine needs to be powered on; code: 3006")
	);
}

#[test]
#[traced_test]
fn typed_listings() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.record([
			(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("sshd")),
			(PropertyId::JOB_RESULT_PROCESS_ID, MemoryValue::from(812i64)),
			(PropertyId::JOB_RESULT_PROCESS_OWNER, MemoryValue::from("root")),
			(
				PropertyId::JOB_RESULT_PROCESS_COMMAND,
				MemoryValue::from("/usr/sbin/sshd -D"),
			),
			(PropertyId::JOB_RESULT_PROCESS_BEING_DEBUGGED, MemoryValue::from(false)),
			(PropertyId::JOB_RESULT_PROCESS_START_TIME, MemoryValue::from(1_700_000_000i32)),
		])
		.finish();

	let process = GuestProcess::try_from(marshaler.decode_at(job, 0, &PROCESS_LISTING).unwrap())
		.unwrap();
	assert_eq!(process.pid, 812);
	assert_eq!(process.command, "/usr/sbin/sshd -D");
	assert!(!process.being_debugged);

	let png = vec![0x89, b'P', b'N', b'G', b'\r', b'\n'];
	let job = engine
		.job()
		.property(PropertyId::JOB_RESULT_SCREEN_IMAGE_DATA, png.clone())
		.finish();

	let screenshot = Screenshot::try_from(marshaler.wait(job, &SCREENSHOT).unwrap()).unwrap();
	assert_eq!(screenshot.bytes, png);

	assert_eq!(engine.live_buffers(), 0);
	assert_eq!(engine.double_frees(), 0);
}

#[test]
#[traced_test]
fn a_record_missing_one_field_decodes_to_nothing() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.record([
			(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("boot.ini")),
			(PropertyId::JOB_RESULT_FILE_SIZE, MemoryValue::from(211i64)),
			(PropertyId::JOB_RESULT_FILE_FLAGS, MemoryValue::from(0i32)),
			(PropertyId::JOB_RESULT_FILE_MOD_TIME, MemoryValue::from(1_690_000_000i64)),
		])
		.record([
			(PropertyId::JOB_RESULT_ITEM_NAME, MemoryValue::from("orphan")),
			(PropertyId::JOB_RESULT_FILE_SIZE, MemoryValue::from(7i64)),
			(PropertyId::JOB_RESULT_FILE_MOD_TIME, MemoryValue::from(1_690_000_001i64)),
		])
		.finish();

	assert_eq!(marshaler.count(job, PropertyId::JOB_RESULT_ITEM_NAME).unwrap(), 2);

	assert!(matches!(
		marshaler.decode_at(job, 1, &FILE_LISTING),
		Err(Error::NotFound { id, .. }) if id == PropertyId::JOB_RESULT_FILE_FLAGS
	));
	assert_eq!(engine.live_buffers(), 0);
	assert_eq!(engine.double_frees(), 0);

	let first = GuestFile::try_from(marshaler.decode_at(job, 0, &FILE_LISTING).unwrap()).unwrap();
	assert_eq!(first.name, "boot.ini");
	assert_eq!(engine.live_buffers(), 0);
}

#[tokio::test]
#[traced_test]
async fn discovery_relays_found_items_in_order() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.event(MemoryEvent::progress())
		.event(MemoryEvent::found("[datastore1] web/web.vmx"))
		.event(MemoryEvent::found("[datastore1] db/db.vmx"))
		.event(MemoryEvent::progress())
		.event(MemoryEvent::found("/vms/build/build.vmx"))
		.finish();

	let (sink, rx) = DiscoverySink::channel();

	let report = marshaler
		.discover(
			|proc, data| {
				engine.attach(job, proc, data);
				job
			},
			sink,
		)
		.unwrap();

	assert_eq!(report, DiscoveryReport { found: 3, skipped: 0 });

	let mut found = Vec::new();
	while let Ok(location) = rx.recv().await {
		info!(%location, "Found");
		found.push(location);
	}

	assert_eq!(
		found,
		[
			"[datastore1] web/web.vmx",
			"[datastore1] db/db.vmx",
			"/vms/build/build.vmx"
		]
	);
	assert_eq!(engine.live_buffers(), 0);
	assert_eq!(engine.double_frees(), 0);
}

#[test]
#[traced_test]
fn discovery_skips_undecodable_events() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.event(MemoryEvent::found("/vms/a.vmx"))
		.event(MemoryEvent::new(EventType::FindItem))
		.event(
			MemoryEvent::new(EventType::FindItem).property(PropertyId::FOUND_ITEM_LOCATION, 17i32),
		)
		.event(MemoryEvent::new(EventType::Other(42)))
		.event(MemoryEvent::found("/vms/b.vmx"))
		.finish();

	let (sink, rx) = DiscoverySink::channel();

	let report = marshaler
		.discover(
			|proc, data| {
				engine.attach(job, proc, data);
				job
			},
			sink,
		)
		.unwrap();

	assert_eq!(report, DiscoveryReport { found: 2, skipped: 2 });
	assert_eq!(rx.try_recv().unwrap(), "/vms/a.vmx");
	assert_eq!(rx.try_recv().unwrap(), "/vms/b.vmx");
	assert!(rx.try_recv().is_err());

	assert_eq!(engine.live_buffers(), 0);
}

#[test]
#[traced_test]
fn discovery_of_a_failed_job() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.event(MemoryEvent::found("/vms/a.vmx"))
		.status(NativeCode(10))
		.finish();

	let error = marshaler
		.discover(
			|proc, data| {
				engine.attach(job, proc, data);
				job
			},
			DiscoverySink::from_fn(|_| {}),
		)
		.unwrap_err();

	assert_eq!(error.kind(), ErrorKind::JobFailed);
	assert_eq!(engine.live_buffers(), 0);
}

#[tokio::test]
#[traced_test]
async fn async_waits_give_up_after_the_timeout() {
	let (engine, marshaler) = setup();
	let job = engine
		.job()
		.property(PropertyId::JOB_RESULT_HANDLE, Handle(77))
		.delay(Duration::from_millis(600))
		.finish();

	let spec = FieldSpec::new().field(PropertyId::JOB_RESULT_HANDLE, PropertyKind::Handle);

	assert!(matches!(
		marshaler.wait_async(job, spec.clone()).await,
		Err(Error::Timeout { handle, .. }) if handle == job
	));

	// The native wait isn't cancelled, later waits still complete
	let record = marshaler.wait(job, &spec).unwrap();
	assert_eq!(
		record.handle_value(PropertyId::JOB_RESULT_HANDLE).unwrap(),
		Handle(77)
	);
}

#[test]
#[traced_test]
fn concurrent_waits_on_distinct_jobs() {
	let (engine, marshaler) = setup();

	let jobs = (0..8i32)
		.map(|exit_code| {
			engine
				.job()
				.property(PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE, exit_code)
				.delay(Duration::from_millis(20))
				.finish()
		})
		.collect::<Vec<_>>();

	let spec = FieldSpec::new().field(
		PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE,
		PropertyKind::Int,
	);

	let exit_codes = thread::scope(|s| {
		jobs.iter()
			.map(|&job| {
				let marshaler = marshaler.clone();
				let spec = &spec;
				s.spawn(move || {
					marshaler.wait(job, spec).and_then(|record| {
						record.int(PropertyId::JOB_RESULT_GUEST_PROGRAM_EXIT_CODE)
					})
				})
			})
			.collect::<Vec<_>>()
			.into_iter()
			.map(|handle| handle.join().unwrap().unwrap())
			.collect::<Vec<_>>()
	});

	assert_eq!(exit_codes, (0..8).collect::<Vec<_>>());
}
