// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::boot::Outcome;
use crate::error::BootError;

/// Jumps to the application entry point.
///
/// # Safety
///
/// The caches must be mapped for the application and `entry` must be its
/// entry address. This never returns and nothing of the bootloader survives.
pub unsafe fn start_app(entry: u32) -> ! {
    info!("Jumping to app entry {:#x}", entry);
    let entry: extern "C" fn() -> ! = core::mem::transmute(entry as usize);
    entry()
}

/// Names the never type `!` on stable, where it can't appear in `Fn*` bounds.
pub trait HasOutput {
    type Output;
}

impl<O> HasOutput for fn() -> O {
    type Output = O;
}

/// The never type `!`.
pub type Never = <fn() -> ! as HasOutput>::Output;

/// Carries out the outcome of a boot run.
pub fn boot(outcome: Outcome, reset: impl FnOnce() -> Never, halt: impl FnOnce(BootError) -> Never) -> ! {
    match outcome {
        // SAFETY: a handoff is only produced after the MMU has been set up for the image.
        Outcome::Handoff { entry } => unsafe { start_app(entry) },
        Outcome::Reset => reset(),
        Outcome::Fatal(e) => {
            error!("Boot failed {:?}", e);
            halt(e)
        }
    }
}
