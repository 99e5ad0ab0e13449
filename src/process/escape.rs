/*!
 * Exclusive-Lock Escape Mode
 *
 * A process presenting the shared secret takes the escape slot and is then
 * the only thing the scheduler runs until it unlocks, blocks, exits, or the
 * next boost. Misuse of either call kills the caller.
 */

use super::kernel::Kernel;
use super::table::ProcTable;
use super::types::{Level, ProcHandle};
use tracing::{info, warn};

impl ProcTable {
    fn kill_for_violation(&mut self, me: ProcHandle, call: &str) {
        let p = self.proc(me);
        warn!(
            call,
            pid = p.pid,
            localtime = p.localtime,
            level = %p.queue,
            "[killed] pid {}, time quantum {}, level {}",
            p.pid,
            p.localtime,
            p.queue.as_u32()
        );
        self.mark_killed(me.index);
    }
}

impl Kernel {
    /// `lock(password)` on behalf of `me`
    pub(crate) fn escape_lock(&self, me: ProcHandle, password: i32) {
        let mut t = self.table.lock();
        if password != self.config.escape_password || t.escape.is_some() {
            self.stats.inc_escape_violations();
            t.kill_for_violation(me, "lock");
            return;
        }

        t.ticks = 0;
        t.proc_mut(me).queue = Level::Special;
        t.escape = Some(me);
        self.stats.inc_escape_grants();
        info!(pid = t.proc(me).pid, "Scheduler locked");
    }

    /// `unlock(password)` on behalf of `me`
    pub(crate) fn escape_unlock(&self, me: ProcHandle, password: i32) {
        let mut t = self.table.lock();
        if password != self.config.escape_password || t.proc(me).queue != Level::Special {
            self.stats.inc_escape_violations();
            t.kill_for_violation(me, "unlock");
            return;
        }

        t.clear_escape(me);
        t.proc_mut(me).reset_level();
        t.queues.push_front(Level::L0, me.index);
        info!(pid = t.proc(me).pid, "Scheduler unlocked");
    }
}
