//! Acoustic units shared by training and synthesis.
//!
//! Training labels each analysis frame with a unit derived from its
//! spectrum; synthesis labels each phoneme with a unit hashed from its
//! symbol.  Both index the same sinusoidal embedding, so the model learns
//! one acoustic frame per unit.

use crate::features::ACOUSTIC_BANDS;

/// Spectral classes (dominant band, folded).
pub const SPECTRAL_CLASSES: usize = 16;
/// Energy quartiles per class.
pub const ENERGY_LEVELS: usize = 4;
/// Total distinct units.
pub const UNIT_COUNT: usize = SPECTRAL_CLASSES * ENERGY_LEVELS;
/// Embedding width; written into the feature vector's padding slots.
pub const EMBEDDING_DIM: usize = 32;

/// Unit of a training frame: dominant log-mel band folded into
/// [`SPECTRAL_CLASSES`], combined with the frame's energy quartile.
///
/// `quartiles` are the 25/50/75 % cut points of mean frame energy over the
/// whole take.
pub fn frame_unit(frame: &[f32], quartiles: &[f32; 3]) -> usize {
    let dominant = frame
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let class = (dominant * SPECTRAL_CLASSES / ACOUSTIC_BANDS).min(SPECTRAL_CLASSES - 1);
    let energy = frame_energy(frame);
    let level = quartiles.iter().filter(|&&q| energy > q).count();
    class * ENERGY_LEVELS + level
}

/// Mean log energy of a frame.
pub fn frame_energy(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<f32>() / frame.len() as f32
}

/// 25/50/75 % cut points of per-frame energy.
pub fn energy_quartiles(frames: &[Vec<f32>]) -> [f32; 3] {
    let mut energies: Vec<f32> = frames.iter().map(|f| frame_energy(f)).collect();
    if energies.is_empty() {
        return [0.0; 3];
    }
    energies.sort_by(f32::total_cmp);
    let at = |q: usize| energies[(energies.len() - 1) * q / 4];
    [at(1), at(2), at(3)]
}

/// Unit of a phoneme symbol (FNV-1a hash).
pub fn phoneme_unit(symbol: &str) -> usize {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in symbol.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash as usize % UNIT_COUNT
}

/// Sinusoidal embedding of `unit`, every component multiplied by `scale`.
pub fn embedding(unit: usize, scale: f32) -> [f32; EMBEDDING_DIM] {
    let mut out = [0.0f32; EMBEDDING_DIM];
    let pos = unit as f32;
    for i in 0..EMBEDDING_DIM / 2 {
        let freq = 1.0 / 10_000f32.powf(2.0 * i as f32 / EMBEDDING_DIM as f32);
        out[2 * i] = (pos * freq).sin() * scale;
        out[2 * i + 1] = (pos * freq).cos() * scale;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_unit_uses_band_and_energy() {
        let quartiles = [-3.0, -2.0, -1.0];
        let mut frame = vec![-5.0; ACOUSTIC_BANDS];
        frame[39] = 5.0;
        // Dominant top band → last class; mean energy -4.75 → lowest level.
        assert_eq!(frame_unit(&frame, &quartiles), (SPECTRAL_CLASSES - 1) * ENERGY_LEVELS);

        let mut loud = vec![0.0; ACOUSTIC_BANDS];
        loud[0] = 1.0;
        assert_eq!(frame_unit(&loud, &quartiles), 3);
    }

    #[test]
    fn quartiles_are_ordered() {
        let frames: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32; 4]).collect();
        let q = energy_quartiles(&frames);
        assert!(q[0] <= q[1] && q[1] <= q[2]);
        assert_eq!(q, [4.0, 9.0, 14.0]);
    }

    #[test]
    fn phoneme_units_are_stable_and_bounded() {
        assert_eq!(phoneme_unit("AE"), phoneme_unit("AE"));
        for p in ["AE", "TH", "SH", "NY", "KH", "ऊ"] {
            assert!(phoneme_unit(p) < UNIT_COUNT);
        }
    }

    #[test]
    fn embedding_scales_linearly() {
        let a = embedding(5, 1.0);
        let b = embedding(5, 2.0);
        for (x, y) in a.iter().zip(&b) {
            assert!((2.0 * x - y).abs() < 1e-6);
        }
        assert_ne!(embedding(5, 1.0), embedding(6, 1.0));
    }
}
