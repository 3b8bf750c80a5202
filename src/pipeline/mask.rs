//! RFI mask checks: fraction of zapped channels, cached next to the mask as JSON.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::FatalError;
use crate::utils::config::{FileNames, MaskThresholds};

#[derive(Debug, Deserialize, Serialize)]
struct MaskInfo {
    fraction_masked_channels: f64,
}

/// Offset of `numchan` in an rfifind mask: six f64 header values precede it.
const NUMCHAN_OFFSET: usize = 6 * 8;

/// Fraction of channels zapped for the whole observation, from the mask header
/// (`numchan`, `numint`, `ptsperint`, then `num_zap_chans`, all little-endian i32).
pub fn read_zapped_fraction(mask: &Path) -> Result<f64> {
    let mut header = [0u8; NUMCHAN_OFFSET + 16];
    std::fs::File::open(mask)
        .and_then(|mut f| f.read_exact(&mut header))
        .with_context(|| format!("read mask header {}", mask.display()))?;
    let int_at = |off: usize| {
        i32::from_le_bytes([header[off], header[off + 1], header[off + 2], header[off + 3]])
    };
    let nchan = int_at(NUMCHAN_OFFSET);
    let zapped = int_at(NUMCHAN_OFFSET + 12);
    if nchan <= 0 || zapped < 0 || zapped > nchan {
        anyhow::bail!(
            "implausible mask header in {} (nchan={nchan}, zapped={zapped})",
            mask.display()
        );
    }
    Ok(f64::from(zapped) / f64::from(nchan))
}

/// Info cache of `mask`, next to it: `obs_rfifind.mask` → `obs_rfifind_mask_info.json`.
pub fn mask_info_path(mask: &Path) -> PathBuf {
    let stem = mask
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    mask.with_file_name(format!("{stem}{}", FileNames::MASK_INFO_SUFFIX))
}

/// Zapped fraction from the mask's own cache, computing and storing it if absent.
pub fn cached_zapped_fraction(mask: &Path) -> Result<f64> {
    let cache = mask_info_path(mask);
    if let Ok(text) = std::fs::read_to_string(&cache)
        && let Ok(info) = serde_json::from_str::<MaskInfo>(&text)
    {
        return Ok(info.fraction_masked_channels);
    }
    let fraction = read_zapped_fraction(mask)?;
    let json = serde_json::to_string_pretty(&MaskInfo {
        fraction_masked_channels: fraction,
    })?;
    if let Err(e) = std::fs::write(&cache, json) {
        warn!("Could not cache mask info in {}: {e}", cache.display());
    }
    Ok(fraction)
}

/// Warn above half the band masked; fail above the fatal threshold.
pub fn check_zapped_fraction(fraction: f64) -> Result<(), FatalError> {
    info!("RFI mask zaps {:.2}% of the channels", fraction * 100.0);
    if fraction > MaskThresholds::FATAL_FRACTION {
        return Err(FatalError::MaskedFractionTooHigh(fraction));
    }
    if fraction > MaskThresholds::WARN_FRACTION {
        warn!(
            "More than {:.0}% of the channels are masked; results may be poor",
            MaskThresholds::WARN_FRACTION * 100.0
        );
    }
    Ok(())
}
