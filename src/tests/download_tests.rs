use proptest::prelude::*;

use super::sim::{firmware, ok, status, Event, ReadStep, RecordingDelay, RecordingFlash, ScriptedTransport};
use crate::ota::{DownloadEngine, OtaError, RetryPolicy};

fn run(
    transport: &mut ScriptedTransport,
    flash: &mut RecordingFlash,
    delay: &mut RecordingDelay,
) -> Result<crate::ota::CompletedDownload, OtaError> {
    let policy = RetryPolicy::default();
    DownloadEngine::new(&policy).download(transport, flash, delay)
}

#[test]
fn exact_delivery_with_stalls_completes() {
    let image = firmware(10240);
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(10240));
    for (i, chunk) in image.chunks(700).enumerate() {
        transport.stalls(i % 10).body(chunk);
    }
    let mut flash = RecordingFlash::default();
    let mut delay = RecordingDelay::default();

    let done = run(&mut transport, &mut flash, &mut delay).unwrap();
    assert_eq!(done.progress.bytes_written, 10240);
    assert_eq!(flash.reserved, Some(10240));
    assert_eq!(flash.data, image);
    assert!(!flash.aborted);
    // Finalizing is the orchestrator's job
    assert!(!flash.finalized);
}

#[test]
fn eleven_consecutive_stalls_time_out() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(2048)).body(&firmware(512)).stalls(11).body(&firmware(1536));
    let mut flash = RecordingFlash::default();
    let mut delay = RecordingDelay::default();

    let err = run(&mut transport, &mut flash, &mut delay).unwrap_err();
    assert_eq!(err, OtaError::StallTimeout { bytes_written: 512, expected_size: 2048 });
    assert!(flash.aborted);
    // Backoff after each of the ten tolerated stalls, none after the eleventh
    assert_eq!(delay.waits_ms, vec![100; 10]);
}

#[test]
fn ten_consecutive_stalls_then_data_succeeds() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(1000)).stalls(10).body(&firmware(1000));
    let mut flash = RecordingFlash::default();
    let mut delay = RecordingDelay::default();

    let done = run(&mut transport, &mut flash, &mut delay).unwrap();
    assert!(done.progress.is_complete());
    assert_eq!(done.progress.consecutive_stalls, 0);
    assert_eq!(transport.read_calls(), 11);
}

#[test]
fn no_read_after_last_byte() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(3000)).body(&firmware(3000)).body(&[0xEE; 64]);
    let mut flash = RecordingFlash::default();

    run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap();
    // 1024 + 1024 + 952, each read capped at what is still missing
    assert_eq!(
        transport.events[1..],
        [Event::Read(1024), Event::Read(1024), Event::Read(952)]
    );
    assert_eq!(transport.reads.front(), Some(&ReadStep::Bytes(vec![0xEE; 64])));
    assert_eq!(flash.data.len(), 3000);
}

#[test]
fn status_zero_retried_exactly_once() {
    let mut transport = ScriptedTransport::new();
    transport.respond(status(0)).respond(status(0)).respond(ok(10));
    let mut flash = RecordingFlash::default();
    let mut delay = RecordingDelay::default();

    let err = run(&mut transport, &mut flash, &mut delay).unwrap_err();
    assert_eq!(err, OtaError::RequestError);
    assert_eq!(transport.requests(), 2);
    assert_eq!(delay.waits_ms, vec![3000]);
    assert!(!flash.touched());
}

#[test]
fn status_zero_then_ok_recovers() {
    let mut transport = ScriptedTransport::new();
    transport.respond(status(0)).respond(ok(16)).body(&firmware(16));
    let mut flash = RecordingFlash::default();

    run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap();
    assert_eq!(transport.requests(), 2);
    assert_eq!(flash.data, firmware(16));
}

#[test]
fn error_status_on_retry_is_reported() {
    let mut transport = ScriptedTransport::new();
    transport.respond(status(0)).respond(status(503)).respond(ok(16));
    let mut flash = RecordingFlash::default();
    let mut delay = RecordingDelay::default();

    let err = run(&mut transport, &mut flash, &mut delay).unwrap_err();
    assert_eq!(err, OtaError::StatusError(503));
    assert_eq!(transport.requests(), 2);
    assert_eq!(delay.waits_ms, vec![3000]);
    assert!(!flash.touched());
}

#[test]
fn non_zero_error_status_is_not_retried() {
    let mut transport = ScriptedTransport::new();
    transport.respond(status(715)).respond(ok(16));
    let mut delay = RecordingDelay::default();

    let err = run(&mut transport, &mut RecordingFlash::default(), &mut delay).unwrap_err();
    assert_eq!(err, OtaError::StatusError(715));
    assert_eq!(transport.requests(), 1);
    assert!(delay.waits_ms.is_empty());
}

#[test]
fn zero_size_never_reserves_storage() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(0));
    let mut flash = RecordingFlash::default();

    let err = run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap_err();
    assert_eq!(err, OtaError::EmptySize);
    assert!(!flash.touched());
    assert_eq!(transport.read_calls(), 0);
}

#[test]
fn oversized_image_is_insufficient_storage() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(5000));
    let mut flash = RecordingFlash { capacity: 4096, ..RecordingFlash::default() };

    let err = run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap_err();
    assert_eq!(err, OtaError::InsufficientStorage { requested: 5000 });
    assert_eq!(transport.read_calls(), 0);
}

#[test]
fn rejected_write_aborts_span() {
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(100)).body(&firmware(100));
    let mut flash = RecordingFlash { reject_writes: true, ..RecordingFlash::default() };

    let err = run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap_err();
    assert_eq!(err, OtaError::WriteFailed { offset: 0 });
    assert!(flash.aborted);
}

#[test]
fn digest_covers_streamed_bytes() {
    use sha2::{Digest, Sha256};

    let image = firmware(4000);
    let mut transport = ScriptedTransport::new();
    transport.respond(ok(image.len())).body(&image);

    let done = run(&mut transport, &mut RecordingFlash::default(), &mut RecordingDelay::default())
        .unwrap();
    assert_eq!(done.sha256.as_slice(), Sha256::digest(&image).as_slice());
}

proptest! {
    #[test]
    fn any_chunking_with_short_stall_runs_completes(
        steps in proptest::collection::vec((1usize..=1024, 0usize..=9), 1..64)
    ) {
        const SIZE: usize = 10240;
        let image = firmware(SIZE);
        let mut transport = ScriptedTransport::new();
        transport.respond(ok(SIZE));

        let mut offset = 0;
        let mut expected_reads = 0;
        for (len, stalls) in steps {
            if offset == SIZE {
                break;
            }
            let end = (offset + len).min(SIZE);
            transport.stalls(stalls).body(&image[offset..end]);
            expected_reads += stalls + 1;
            offset = end;
        }
        while offset < SIZE {
            let end = (offset + 1024).min(SIZE);
            transport.body(&image[offset..end]);
            expected_reads += 1;
            offset = end;
        }
        transport.body(&[0xEE; 16]);

        let mut flash = RecordingFlash::default();
        let done = run(&mut transport, &mut flash, &mut RecordingDelay::default()).unwrap();

        prop_assert!(done.progress.is_complete());
        prop_assert_eq!(flash.data, image);
        prop_assert_eq!(transport.read_calls(), expected_reads);
        prop_assert_eq!(done.progress.reads as usize, expected_reads);
        prop_assert_eq!(transport.reads.len(), 1);
    }
}
