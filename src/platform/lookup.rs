// platform/lookup.rs
// Optional authoritative platform resolution via the creating program id.

use anyhow::Result;
use async_trait::async_trait;

use crate::types::Platform;

/// Launch program ids for the recognized platforms.
const PUMP_FUN_PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
const LETS_BONK_PROGRAM: &str = "LanMV9sAd7wArD4vJFi2qDdfnVhFxYSUg6eADduJ3uj";

/// Resolves the program that created a mint. Implementations talk to an
/// external directory and may fail transiently; the detector's retry
/// buffer owns the retry policy.
#[async_trait]
pub trait ProgramLookup: Send + Sync {
    async fn resolve_program(&self, mint: &str) -> Result<Option<String>>;
}

/// Map a creating program id to a platform, if it is one we recognize.
pub fn platform_for_program(program_id: &str) -> Option<Platform> {
    match program_id {
        PUMP_FUN_PROGRAM => Some(Platform::PumpFun),
        LETS_BONK_PROGRAM => Some(Platform::LetsBonk),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_programs() {
        assert_eq!(
            platform_for_program(PUMP_FUN_PROGRAM),
            Some(Platform::PumpFun)
        );
        assert_eq!(
            platform_for_program(LETS_BONK_PROGRAM),
            Some(Platform::LetsBonk)
        );
        assert_eq!(platform_for_program("11111111111111111111111111111111"), None);
    }
}
