//! 執行中的暫停與取消控制
//!
//! 外部只透過 [`RunControl`] 的方法改變狀態；比對引擎只讀取並在檢查點等待。

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunState {
    pub paused: bool,
    pub cancel_requested: bool,
}

#[derive(Debug, Default)]
pub struct RunControl {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl RunControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut RunState)) {
        let mut state = self.lock();
        f(&mut state);
        drop(state);
        self.changed.notify_all();
    }

    /// 開始新的執行前清除兩個旗標
    pub fn reset(&self) {
        self.update(|state| *state = RunState::default());
    }

    pub fn pause(&self) {
        self.update(|state| state.paused = true);
    }

    pub fn resume(&self) {
        self.update(|state| state.paused = false);
    }

    /// 切換暫停狀態，回傳切換後是否為暫停
    pub fn toggle_pause(&self) -> bool {
        let mut paused = false;
        self.update(|state| {
            state.paused = !state.paused;
            paused = state.paused;
        });
        paused
    }

    /// 取消後只有下一次 `reset()` 會清除
    pub fn request_cancel(&self) {
        self.update(|state| state.cancel_requested = true);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        *self.lock()
    }

    /// 暫停時阻塞到恢復或取消
    ///
    /// 回傳 `false` 表示已要求取消。
    pub fn wait_while_paused(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .changed
            .wait_while(guard, |state| state.paused && !state.cancel_requested)
            .unwrap_or_else(PoisonError::into_inner);
        !guard.cancel_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_flags_and_reset() {
        let control = RunControl::new();
        control.pause();
        control.request_cancel();
        assert_eq!(
            control.state(),
            RunState {
                paused: true,
                cancel_requested: true
            }
        );

        control.resume();
        assert!(control.is_cancel_requested());

        control.reset();
        assert_eq!(control.state(), RunState::default());
    }

    #[test]
    fn test_toggle_pause() {
        let control = RunControl::new();
        assert!(control.toggle_pause());
        assert!(control.is_paused());
        assert!(!control.toggle_pause());
        assert!(!control.is_paused());
    }

    #[test]
    fn test_wait_returns_immediately_when_running() {
        let control = RunControl::new();
        assert!(control.wait_while_paused());
    }

    #[test]
    fn test_resume_wakes_waiter() {
        let control = Arc::new(RunControl::new());
        control.pause();

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || tx.send(control.wait_while_paused()).unwrap())
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        control.resume();
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        waiter.join().unwrap();
    }

    #[test]
    fn test_cancel_wakes_paused_waiter() {
        let control = Arc::new(RunControl::new());
        control.pause();

        let waiter = {
            let control = Arc::clone(&control);
            thread::spawn(move || control.wait_while_paused())
        };

        thread::sleep(Duration::from_millis(50));
        control.request_cancel();
        assert!(!waiter.join().unwrap());
    }
}
