// SPDX-License-Identifier: CEPL-1.0
use std::path::Path;

use tracing::{info, warn};

use crate::{RenderError, RenderResult};

pub const DEBUG_DRAW_VERT: &str = "debugdraw.vert.spv";
pub const DEBUG_DRAW_FRAG: &str = "debugdraw.frag.spv";

/// SPIR-V for the debug-draw pass. The bytes are opaque to the renderer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderBinaries {
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
}

#[cfg(feature = "builtin-shaders")]
mod builtin {
    pub const VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/debugdraw.vert.spv"));
    pub const FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/debugdraw.frag.spv"));
}

fn read(dir: &Path, name: &str) -> RenderResult<Vec<u8>> {
    let path = dir.join(name);
    std::fs::read(&path).map_err(|source| RenderError::ShaderRead { path, source })
}

impl ShaderBinaries {
    pub fn new(vertex: Vec<u8>, fragment: Vec<u8>) -> Self {
        Self { vertex, fragment }
    }

    /// Reads the precompiled debug-draw shaders from `dir`. With the
    /// `builtin-shaders` feature, falls back to the embedded copies.
    pub fn load_debug_draw(dir: &Path) -> RenderResult<Self> {
        match (read(dir, DEBUG_DRAW_VERT), read(dir, DEBUG_DRAW_FRAG)) {
            (Ok(vertex), Ok(fragment)) => {
                info!("debug-draw shaders loaded from {}", dir.display());
                Ok(Self { vertex, fragment })
            }
            (Err(e), _) | (_, Err(e)) => Self::fallback(e),
        }
    }

    #[cfg(feature = "builtin-shaders")]
    fn fallback(err: RenderError) -> RenderResult<Self> {
        warn!("{err}; using built-in debug-draw shaders");
        Ok(Self {
            vertex: builtin::VERT.to_vec(),
            fragment: builtin::FRAG.to_vec(),
        })
    }

    #[cfg(not(feature = "builtin-shaders"))]
    fn fallback(err: RenderError) -> RenderResult<Self> {
        warn!("{err}");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_both_stages_from_dir() {
        let dir = std::env::temp_dir().join(format!("mercury-shaders-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(DEBUG_DRAW_VERT), [3u8, 2, 0x23, 7]).unwrap();
        std::fs::write(dir.join(DEBUG_DRAW_FRAG), [3u8, 2, 0x23, 7, 0, 0, 0, 0]).unwrap();

        let bins = ShaderBinaries::load_debug_draw(&dir).unwrap();
        assert_eq!(bins.vertex.len(), 4);
        assert_eq!(bins.fragment.len(), 8);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[cfg(not(feature = "builtin-shaders"))]
    #[test]
    fn missing_dir_names_the_file() {
        let err = ShaderBinaries::load_debug_draw(Path::new("no/such/shader/dir")).unwrap_err();
        match err {
            RenderError::ShaderRead { path, .. } => assert!(path.ends_with(DEBUG_DRAW_VERT)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
