use seir_core::RngHandle;

/// Substream reserved for the control thread (prior draws and SMC perturbation).
pub const CONTROL_STREAM: u64 = 0x5345_4952;

/// Fresh control RNG for a fit configured with `random_seed`.
pub fn control_rng(random_seed: u64) -> RngHandle {
    RngHandle::substream(random_seed, CONTROL_STREAM)
}
