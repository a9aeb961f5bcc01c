use rand::Rng;

/// Polling-interval widening under sustained transport failures.
/// `base_ms` is the normal poll interval; backoff multiplies it rather than
/// hammering the remote at the same rate while it is down.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_pct: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 4_000,
            max_ms: 60_000,
            jitter_pct: 0.20,
        }
    }
}

/// Delay before the next pass at backoff `level` (1 = first pass after the
/// failure threshold was crossed). base * 2^level, capped, jittered.
pub fn next_delay_ms(level: u32, cfg: &BackoffConfig, rng: &mut impl Rng) -> u64 {
    let level = level.max(1);

    // 2^level with overflow protection; the cap absorbs any excess.
    let pow2 = 1_u64.checked_shl(level).unwrap_or(u64::MAX);

    let mut delay = cfg.base_ms.saturating_mul(pow2);
    if delay > cfg.max_ms {
        delay = cfg.max_ms;
    }

    // jitter in range [-jitter_pct, +jitter_pct]
    let jitter_range = (delay as f64) * cfg.jitter_pct;
    let jitter = if jitter_range > 0.0 {
        rng.gen_range(-jitter_range..=jitter_range)
    } else {
        0.0
    };

    let jittered = (delay as f64 + jitter).round() as u64;
    jittered.min(cfg.max_ms)
}
