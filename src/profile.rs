use crate::error::ProfileError;
use std::fs::File;
use std::io;

/// A CPU/heap profiler, e.g. a wrapper around `pprof` or `dhat`.
///
/// The helpers below only deal with paths and files; the profile format
/// is entirely up to the implementation.
pub trait Profiler: Send + Sync {
    fn start_cpu(&self, out: File) -> io::Result<()>;
    fn stop_cpu(&self);
    fn write_heap(&self, out: File) -> io::Result<()>;
}

/// Stops CPU profiling when dropped.
#[must_use = "profiling stops as soon as the guard is dropped"]
pub struct ProfileGuard<'a> {
    profiler: Option<&'a dyn Profiler>,
}

impl ProfileGuard<'_> {
    pub fn stop(self) {}
}

impl Drop for ProfileGuard<'_> {
    fn drop(&mut self) {
        if let Some(p) = self.profiler.take() {
            p.stop_cpu();
        }
    }
}

/// Start CPU profiling into `path`; an empty path does nothing.
///
/// ```ignore
/// fn main() {
///     let _cpu = chainlog::profile::profile_cpu("cpu.prof", &profiler)?;
///     // ..work..
/// }
/// ```
pub fn profile_cpu<'a>(path: &str, profiler: &'a dyn Profiler) -> Result<ProfileGuard<'a>, ProfileError> {
    if path.is_empty() {
        return Ok(ProfileGuard { profiler: None });
    }

    let fp = create(path)?;
    profiler.start_cpu(fp).map_err(ProfileError::Profiler)?;
    Ok(ProfileGuard {
        profiler: Some(profiler),
    })
}

/// Write a heap profile to `path`; an empty path does nothing. Usually
/// called just before the program exits.
pub fn profile_heap(path: &str, profiler: &dyn Profiler) -> Result<(), ProfileError> {
    if path.is_empty() {
        return Ok(());
    }
    profiler.write_heap(create(path)?).map_err(ProfileError::Profiler)
}

fn create(path: &str) -> Result<File, ProfileError> {
    File::create(path).map_err(|source| ProfileError::Create {
        path: path.to_string(),
        source,
    })
}
