//! Best-effort kernel hot patching.
//!
//! The source timestamp is polled once per frame. A changed file is
//! recompiled with the same defines; the running kernel is only replaced
//! when the new one compiled. Either way the new timestamp is remembered, so
//! a broken file is not recompiled every frame.

use std::{
    io,
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime},
};

use crate::kernel::{read_source, KernelCompiler, KernelDefines, KernelError};

#[derive(Debug)]
pub enum ReloadOutcome {
    /// Timestamp unchanged, nothing to do.
    Unchanged,
    /// New kernel compiled and swapped in. Accumulated samples are stale.
    Reloaded,
    /// Recompilation failed, previous kernel still active.
    Failed(KernelError),
    /// Timestamp could not be read, previous kernel still active.
    Unavailable,
}

impl ReloadOutcome {
    pub fn is_reloaded(&self) -> bool {
        matches!(self, ReloadOutcome::Reloaded)
    }
}

fn source_stamp(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

pub struct KernelHotReloader<K> {
    path: PathBuf,
    defines: KernelDefines,
    kernel: K,
    stamp: Option<SystemTime>,
    compile_budget: Duration,
    source_missing: bool,
}

impl<K> KernelHotReloader<K> {
    /// Compile the initial kernel. Failure here is fatal for the caller.
    pub fn new<C>(
        path: impl Into<PathBuf>,
        defines: KernelDefines,
        compiler: &C,
    ) -> Result<Self, KernelError>
    where
        C: KernelCompiler<Kernel = K> + ?Sized,
    {
        let path = path.into();
        // Stamp first so an edit racing the initial read is picked up next frame.
        let stamp = source_stamp(&path).ok();
        let source = read_source(&path)?;
        let kernel = compiler.compile(&source, &defines)?;
        tracing::info!(path = %path.display(), "kernel compiled");

        Ok(Self {
            path,
            defines,
            kernel,
            stamp,
            compile_budget: Duration::from_millis(250),
            source_missing: false,
        })
    }

    /// Compiles slower than this are reported, they still block the frame.
    pub fn with_compile_budget(mut self, budget: Duration) -> Self {
        self.compile_budget = budget;
        self
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn defines(&self) -> &KernelDefines {
        &self.defines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Once-per-frame check.
    pub fn poll<C>(&mut self, compiler: &C) -> ReloadOutcome
    where
        C: KernelCompiler<Kernel = K> + ?Sized,
    {
        let stamp = match source_stamp(&self.path) {
            Ok(stamp) => stamp,
            Err(err) => {
                if !self.source_missing {
                    tracing::warn!(path = %self.path.display(), error = %err, "kernel source unavailable");
                    self.source_missing = true;
                }
                return ReloadOutcome::Unavailable;
            }
        };
        self.source_missing = false;

        if self.stamp == Some(stamp) {
            return ReloadOutcome::Unchanged;
        }
        self.stamp = Some(stamp);

        let started = Instant::now();
        let compiled = read_source(&self.path).and_then(|source| compiler.compile(&source, &self.defines));
        let elapsed = started.elapsed();
        if elapsed > self.compile_budget {
            tracing::warn!(?elapsed, budget = ?self.compile_budget, "kernel compile exceeded frame budget");
        }

        match compiled {
            Ok(kernel) => {
                // Old kernel is released here, after the new one proved valid.
                self.kernel = kernel;
                tracing::info!(path = %self.path.display(), ?elapsed, "kernel reloaded");
                ReloadOutcome::Reloaded
            }
            Err(err) => {
                tracing::warn!(error = %err, "kernel reload failed, keeping last good kernel");
                ReloadOutcome::Failed(err)
            }
        }
    }
}
