use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::math::div_ceil;

/// Compile-time constants shared between host and kernel. Frozen at first
/// compile and reused verbatim on every reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelDefines {
    pub spheres_count: u32,
    pub group_size_x: u32,
    pub group_size_y: u32,
}

impl Default for KernelDefines {
    fn default() -> Self {
        Self {
            spheres_count: 75,
            group_size_x: 16,
            group_size_y: 16,
        }
    }
}

impl KernelDefines {
    /// WGSL has no preprocessor, so the defines become module-scope constants.
    pub fn prelude(&self) -> String {
        format!(
            "const SPHERES_COUNT: u32 = {}u;\nconst GROUP_SIZE_X: u32 = {}u;\nconst GROUP_SIZE_Y: u32 = {}u;\n",
            self.spheres_count, self.group_size_x, self.group_size_y
        )
    }

    pub fn expand(&self, source: &str) -> String {
        let mut expanded = self.prelude();
        expanded.push_str(&self.resolve_workgroup_size(source));
        expanded
    }

    /// naga only accepts integer literals inside `@workgroup_size(...)`, so
    /// the group size constants are spelled out there.
    fn resolve_workgroup_size(&self, source: &str) -> String {
        const ATTRIBUTE: &str = "@workgroup_size(";

        let mut resolved = String::with_capacity(source.len());
        let mut rest = source;
        while let Some(start) = rest.find(ATTRIBUTE) {
            let args_start = start + ATTRIBUTE.len();
            let Some(args_len) = rest[args_start..].find(')') else {
                break;
            };
            let args = &rest[args_start..args_start + args_len];
            resolved.push_str(&rest[..args_start]);
            resolved.push_str(
                &args
                    .replace("GROUP_SIZE_X", &self.group_size_x.to_string())
                    .replace("GROUP_SIZE_Y", &self.group_size_y.to_string()),
            );
            rest = &rest[args_start + args_len..];
        }
        resolved.push_str(rest);
        resolved
    }

    /// Workgroup grid covering a `width` x `height` target.
    pub fn workgroups(&self, width: u32, height: u32) -> [u32; 3] {
        [
            div_ceil(width, self.group_size_x),
            div_ceil(height, self.group_size_y),
            1,
        ]
    }
}

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Failed to read kernel source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Kernel compilation failed: {0}")]
    Compile(String),
}

/// Turns kernel source into something dispatchable.
pub trait KernelCompiler {
    type Kernel;

    /// `source` is the raw file content; implementors apply `defines` themselves.
    fn compile(&self, source: &str, defines: &KernelDefines) -> Result<Self::Kernel, KernelError>;
}

pub fn read_source(path: &Path) -> Result<String, KernelError> {
    std::fs::read_to_string(path).map_err(|source| KernelError::Read {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_declares_every_define() {
        let defines = KernelDefines {
            spheres_count: 8,
            group_size_x: 4,
            group_size_y: 2,
        };
        let expanded = defines.expand("fn main() {}\n");
        assert!(expanded.starts_with("const SPHERES_COUNT: u32 = 8u;\n"));
        assert!(expanded.contains("const GROUP_SIZE_X: u32 = 4u;\n"));
        assert!(expanded.contains("const GROUP_SIZE_Y: u32 = 2u;\n"));
        assert!(expanded.ends_with("fn main() {}\n"));
    }

    #[test]
    fn workgroup_size_attribute_gets_literals() {
        let defines = KernelDefines {
            spheres_count: 8,
            group_size_x: 8,
            group_size_y: 4,
        };
        let source = "@compute @workgroup_size(GROUP_SIZE_X, GROUP_SIZE_Y, 1)\nfn main() {\n    let n = GROUP_SIZE_X;\n}\n";
        let expanded = defines.expand(source);
        assert!(expanded.contains("@compute @workgroup_size(8, 4, 1)\nfn main()"));
        // Other uses keep referring to the constant.
        assert!(expanded.contains("let n = GROUP_SIZE_X;"));
    }

    #[test]
    fn workgroups_cover_partial_tiles() {
        let defines = KernelDefines::default();
        assert_eq!(defines.workgroups(640, 480), [40, 30, 1]);
        assert_eq!(defines.workgroups(650, 481), [41, 31, 1]);
    }

    #[test]
    fn missing_source_is_a_read_error() {
        let err = read_source(Path::new("does/not/exist.wgsl")).unwrap_err();
        assert!(matches!(err, KernelError::Read { .. }));
    }
}
