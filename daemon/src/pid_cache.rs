use crate::process_registry::{Pid, ProcessRegistry};

/// Last known PIDs of one executable, so frequent foreground checks do not
/// enumerate the whole process table every time.
///
/// Staleness is bounded by one call: dead PIDs are pruned on the next
/// [`PidCache::is_foreground_cached`], and a cache that prunes down to
/// nothing is refetched immediately.
#[derive(Debug, Default)]
pub struct PidCache {
    pids: Vec<Pid>,
}

impl PidCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    pub fn is_foreground_cached(&mut self, registry: &dyn ProcessRegistry, name: &str) -> bool {
        if self.pids.is_empty() {
            self.pids = registry.list_pids_by_name(name);
        } else {
            self.pids.retain(|&pid| registry.is_running(pid));
            if self.pids.is_empty() {
                self.pids = registry.list_pids_by_name(name);
            }
        }

        self.pids.iter().any(|&pid| registry.is_foreground(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process_registry::fake::FakeRegistry;

    const GAME: &str = "League of Legends.exe";

    #[test]
    fn first_call_populates_from_registry() {
        let reg = FakeRegistry::default();
        reg.add(10, GAME, false);
        reg.add(20, GAME, true);

        let mut cache = PidCache::new();
        assert!(cache.is_foreground_cached(&reg, GAME));
        assert_eq!(cache.pids(), &[10, 20]);
        assert_eq!(reg.list_count(), 1);
    }

    #[test]
    fn live_cache_is_reused_without_enumeration() {
        let reg = FakeRegistry::default();
        reg.add(10, GAME, false);
        reg.add(20, GAME, false);

        let mut cache = PidCache::new();
        assert!(!cache.is_foreground_cached(&reg, GAME));
        reg.set_foreground(20, true);
        assert!(cache.is_foreground_cached(&reg, GAME));
        assert_eq!(reg.list_count(), 1);
    }

    #[test]
    fn dead_pids_are_pruned_without_refetch_while_some_survive() {
        let reg = FakeRegistry::default();
        reg.add(10, GAME, false);
        reg.add(20, GAME, true);

        let mut cache = PidCache::new();
        cache.is_foreground_cached(&reg, GAME);
        reg.set_running(10, false);

        assert!(cache.is_foreground_cached(&reg, GAME));
        assert_eq!(cache.pids(), &[20]);
        assert_eq!(reg.list_count(), 1);
    }

    #[test]
    fn all_dead_forces_a_fresh_enumeration() {
        let reg = FakeRegistry::default();
        reg.add(10, GAME, false);
        reg.add(20, GAME, false);

        let mut cache = PidCache::new();
        cache.is_foreground_cached(&reg, GAME);
        assert_eq!(cache.pids(), &[10, 20]);

        reg.set_running(10, false);
        reg.set_running(20, false);
        reg.add(30, GAME, true);

        assert!(cache.is_foreground_cached(&reg, GAME));
        assert_eq!(cache.pids(), &[30]);
        assert_eq!(reg.list_count(), 2);
    }

    #[test]
    fn empty_cache_refetches_on_every_call() {
        let reg = FakeRegistry::default();
        let mut cache = PidCache::new();

        assert!(!cache.is_foreground_cached(&reg, GAME));
        assert!(!cache.is_foreground_cached(&reg, GAME));
        assert_eq!(reg.list_count(), 2);
    }
}
