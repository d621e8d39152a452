//! Full loader-stack scenarios against the emulated backend.

use std::sync::{Arc, Mutex};
use std::thread;

use pretty_assertions::assert_eq;

use jtag_bootrom::{
    bootcode, verify, Chip, EmulatedControl, EmulatedTap, Error, Tap, TargetParams,
};

fn init_logs() {
    let _ = pretty_env_logger::try_init();
}

/// A chip over a zeroed emulated buffer of `words` words, plus the
/// harness-side handles into its memory and control lines.
fn emulated_chip(words: usize) -> (Chip, Arc<Mutex<Vec<u32>>>, EmulatedControl) {
    let tap = EmulatedTap::new(words);
    let sram = tap.sram();
    let control = EmulatedControl::new();
    let chip = Chip::new(Box::new(tap), Box::new(control.clone()));
    (chip, sram, control)
}

/// The §8-style happy path: claim, reset, patch the embedded image,
/// verify it, release the core. The buffer must equal the image after.
#[test]
fn full_bringup_round_trips_the_embedded_image() {
    init_logs();
    let words = bootcode::bootcode();
    let (chip, sram, _control) = emulated_chip(words.len());

    let mut session = chip.claim().expect("claim failed");
    session.reset_asic().expect("reset failed");
    session.patch(words).expect("patch failed");
    session.verify(words).expect("verify failed");
    session.soft_reset_arc().expect("soft reset failed");
    session.teardown();

    assert_eq!(sram.lock().unwrap().as_slice(), words);
}

#[test]
fn round_trips_hold_at_nonzero_bases() {
    for (base, len) in [(0u32, 8usize), (0x40, 4), (0x80, 16)] {
        let words: Vec<u32> = (0..len as u32).map(|i| 0xB000_0000 + i).collect();
        let buffer_words = (base / 4) as usize + len;
        let (chip, sram, _control) = emulated_chip(buffer_words);

        let mut session = chip.claim().expect("claim failed");
        session.reset_asic().expect("reset failed");
        session.patch_offset(&words, base).expect("patch failed");
        session.verify_offset(&words, base).expect("verify failed");
        session.teardown();

        let sram = sram.lock().unwrap();
        assert_eq!(&sram[(base / 4) as usize..], words.as_slice());
    }
}

#[test]
fn verify_reports_the_first_corrupted_word() {
    let words = bootcode::bootcode();
    let (chip, sram, _control) = emulated_chip(words.len());
    let mut session = chip.claim().expect("claim failed");
    session.reset_asic().expect("reset failed");
    session.patch(words).expect("patch failed");

    let corrupted = 5;
    sram.lock().unwrap()[corrupted] ^= 0x00FF_0000;

    match session.verify(words) {
        Err(Error::VerifyMismatch {
            index,
            expected,
            actual,
        }) => {
            assert_eq!(index, corrupted);
            assert_eq!(expected, words[corrupted]);
            assert_eq!(actual, words[corrupted] ^ 0x00FF_0000);
        }
        other => panic!("expected a mismatch at word {corrupted}, got {other:?}"),
    }
}

/// A divergence in the very first word is the wiring-fault signature;
/// it must be reported just like any later corruption.
#[test]
fn verify_reports_a_first_word_mismatch() {
    let words = bootcode::bootcode();
    let (chip, sram, _control) = emulated_chip(words.len());
    let mut session = chip.claim().expect("claim failed");
    session.reset_asic().expect("reset failed");
    session.patch(words).expect("patch failed");

    sram.lock().unwrap()[0] = !words[0];

    match session.verify(words) {
        Err(Error::VerifyMismatch { index, .. }) => assert_eq!(index, 0),
        other => panic!("expected a mismatch at word 0, got {other:?}"),
    }
}

/// Once the core is released, patch and verify are refused until a
/// fresh reset brings the session back to a patchable state.
#[test]
fn patch_is_refused_while_the_core_runs() {
    let words = bootcode::bootcode();
    let (chip, _sram, _control) = emulated_chip(words.len());
    let mut session = chip.claim().expect("claim failed");
    session.reset_asic().expect("reset failed");
    session.patch(words).expect("patch failed");
    session.soft_reset_arc().expect("soft reset failed");

    assert!(matches!(
        session.patch(words),
        Err(Error::DeviceNotReady(_))
    ));
    assert!(matches!(
        session.verify(words),
        Err(Error::DeviceNotReady(_))
    ));

    session.reset_asic().expect("reset failed");
    session.patch(words).expect("patch after reset failed");
}

#[test]
fn try_claim_reports_busy_while_a_session_lives() {
    let (chip, _sram, _control) = emulated_chip(16);
    let session = chip.claim().expect("claim failed");

    assert!(matches!(chip.try_claim(), Err(Error::Busy)));

    drop(session);
    chip.try_claim().expect("claim after drop failed");
}

#[test]
fn claim_is_gated_on_power_good() {
    let (chip, _sram, control) = emulated_chip(16);
    control.set_power_good(false);
    assert!(matches!(chip.claim(), Err(Error::NotPowered)));

    control.set_power_good(true);
    chip.claim().expect("claim with power restored failed");
}

/// Claiming holds the core in reset; a hard reset releases the lines,
/// and so does tearing the session down at any point.
#[test]
fn reset_lines_track_the_session_lifecycle() {
    let (chip, _sram, control) = emulated_chip(16);
    let mut session = chip.claim().expect("claim failed");
    assert!(control.asic_reset_asserted());
    assert!(control.spi_reset_asserted());

    session.reset_asic().expect("reset failed");
    assert!(!control.asic_reset_asserted());
    assert!(!control.spi_reset_asserted());
    drop(session);

    let session = chip.claim().expect("reclaim failed");
    assert!(control.asic_reset_asserted());
    session.teardown();
    assert!(!control.asic_reset_asserted());
    assert!(!control.spi_reset_asserted());
}

/// Teardown must be a safe no-op at any point, claimed or not.
#[test]
fn teardown_is_safe_without_a_claim() {
    let (chip, _sram, _control) = emulated_chip(16);
    chip.release();
    chip.release();

    let session = chip.claim().expect("claim failed");
    drop(session);
    chip.release();
}

/// Two bring-ups on one chip from two threads must serialize: each
/// verifies its own pattern inside its session, which only holds if the
/// lock covers the whole patch-and-verify span.
#[test]
fn bringups_serialize_on_one_chip() {
    init_logs();
    let pattern_a: Vec<u32> = (0..16).map(|i| 0xAAAA_0000 + i).collect();
    let pattern_b: Vec<u32> = (0..16).map(|i| 0xBBBB_0000 + i).collect();
    let (chip, sram, _control) = emulated_chip(16);
    let chip = Arc::new(chip);

    let mut handles = Vec::new();
    for pattern in [pattern_a.clone(), pattern_b.clone()] {
        let chip = Arc::clone(&chip);
        handles.push(thread::spawn(move || {
            let mut session = chip.claim().expect("claim failed");
            session.reset_asic().expect("reset failed");
            session.patch(&pattern).expect("patch failed");
            session.verify(&pattern).expect("verify failed");
            session.teardown();
        }));
    }
    for handle in handles {
        handle.join().expect("bring-up thread panicked");
    }

    let final_words = sram.lock().unwrap().clone();
    assert!(final_words.as_slice() == pattern_a || final_words.as_slice() == pattern_b);
}

/// Verification is addressed by TAP handle, so a harness can check a
/// buffer against expected words without ever building a chip context.
#[test]
fn verify_works_on_a_bare_tap_handle() {
    let adapter = EmulatedTap::new(8);
    let sram = adapter.sram();
    let mut tap = Tap::new(Box::new(adapter));

    let words: Vec<u32> = (0x10..0x18).collect();
    sram.lock().unwrap().copy_from_slice(&words);

    verify(&mut tap, TargetParams::blackhole(), &words).expect("verify failed");
}
