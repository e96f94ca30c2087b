//! CPU affinity for the consumer thread.

use crate::error::Result;

/// Pin the calling thread to `cpu_id`.
#[cfg(target_os = "linux")]
pub fn pin_to_cpu(cpu_id: usize) -> Result<()> {
    use nix::sched::{ sched_setaffinity, CpuSet };
    use nix::unistd::Pid;

    let mut cpu_set = CpuSet::new();
    cpu_set.set(cpu_id)?;
    // pid 0 is the calling thread
    sched_setaffinity(Pid::from_raw(0), &cpu_set)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_to_cpu(_cpu_id: usize) -> Result<()> {
    Ok(())
}

/// Pin the current thread if `cpu` is set. A failure is logged and the
/// thread keeps running unpinned.
pub(crate) fn pin_consumer(cpu: Option<usize>) {
    let Some(cpu_id) = cpu else {
        return;
    };
    match pin_to_cpu(cpu_id) {
        Ok(()) => tracing::debug!(cpu_id, "consumer thread pinned"),
        Err(err) => tracing::warn!(cpu_id, error = %err, "failed to pin consumer thread, continuing unpinned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_to_allowed_cpu() {
        use nix::sched::{ sched_getaffinity, CpuSet };
        use nix::unistd::Pid;

        let allowed = sched_getaffinity(Pid::from_raw(0)).unwrap();
        let cpu_id = (0..CpuSet::count())
            .find(|&cpu| allowed.is_set(cpu).unwrap_or(false))
            .unwrap();
        std::thread::spawn(move || pin_to_cpu(cpu_id).unwrap()).join().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pin_out_of_range_is_error() {
        let result = std::thread::spawn(|| pin_to_cpu(usize::MAX)).join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_pin_consumer_failure_is_not_fatal() {
        std::thread::spawn(|| {
            pin_consumer(Some(usize::MAX));
            pin_consumer(None);
        })
            .join()
            .unwrap();
    }
}
