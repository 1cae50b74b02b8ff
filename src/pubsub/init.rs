use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// Таймаут ожидания инициализации канала по умолчанию.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Одноразовый барьер инициализации канала.
///
/// Срабатывает ровно один раз: создатель узла вызывает [`complete`] после
/// того, как отработали инициализаторы и глобальные слушатели. Остальные
/// потоки ждут в [`wait`] не дольше заданного таймаута.
///
/// [`complete`]: InitBarrier::complete
/// [`wait`]: InitBarrier::wait
#[derive(Debug, Default)]
pub struct InitBarrier {
    done: AtomicBool,
    lock: Mutex<bool>,
    cvar: Condvar,
}

impl InitBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Открывает барьер и будит всех ожидающих. Повторный вызов ничего не
    /// делает.
    pub fn complete(&self) {
        let mut done = self.lock.lock();
        if !*done {
            *done = true;
            self.done.store(true, Ordering::Release);
            self.cvar.notify_all();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Ждёт открытия барьера. Возвращает `false` по истечении таймаута.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        if self.is_complete() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let mut done = self.lock.lock();
        while !*done {
            if self.cvar.wait_until(&mut done, deadline).timed_out() {
                return *done;
            }
        }
        true
    }
}
