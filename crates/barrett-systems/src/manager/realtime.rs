//! 实时执行管理器
//!
//! 在专用线程上以固定周期执行：
//! 1. 等待下一个唤醒点；唤醒点已过则立即执行，并记录错过的唤醒点数量（不补跑）
//! 2. 执行一个周期，记录耗时
//! 3. 周期返回错误或 panic 时进入错误状态，调用错误回调（默认终止进程）并退出循环
//!
//! 错误状态会一直保持，直到调用 [`clear_error`](RealTimeExecutionManager::clear_error)。

use super::stats::LoopStats;
use super::{CycleStatistics, ExecutionManager, ManagerCore};
use crate::error::SystemError;
use barrett_driver::ExecutionConfig;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 错误回调，参数为错误描述
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

struct Shared {
    running: AtomicBool,
    stop_requested: AtomicBool,
    error: Mutex<Option<String>>,
    callback: Mutex<Option<ErrorCallback>>,
    stats: Mutex<LoopStats>,
}

impl Shared {
    fn enter_error(&self, message: String) {
        *self.error.lock() = Some(message.clone());
        self.running.store(false, Ordering::Release);
        // 回调可能终止进程或调用 stop()，不能持锁调用
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(&message);
        }
    }
}

fn abort_on_error() -> ErrorCallback {
    Arc::new(|message: &str| {
        error!("Aborting process after control loop failure: {}", message);
        std::process::abort();
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 实时执行管理器
///
/// # 示例
///
/// ```no_run
/// use barrett_systems::{ExecutionManager, RealTimeExecutionManager};
///
/// let em = RealTimeExecutionManager::new(0.002)?;
/// em.set_error_callback(|msg| eprintln!("control loop stopped: {msg}"));
/// em.start()?;
/// // ... start_managing / connect ...
/// em.stop();
/// println!("{:?}", em.statistics());
/// # Ok::<(), barrett_systems::SystemError>(())
/// ```
pub struct RealTimeExecutionManager {
    core: Arc<ManagerCore>,
    shared: Arc<Shared>,
    period: Duration,
    thread_priority: bool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RealTimeExecutionManager {
    /// 以给定周期（秒）创建，其余参数取默认值
    pub fn new(period_s: f64) -> Result<Self, SystemError> {
        Self::with_config(ExecutionConfig {
            period_s,
            ..Default::default()
        })
    }

    /// 从配置创建
    ///
    /// # 错误
    ///
    /// 周期不是正数时返回配置错误。
    pub fn with_config(config: ExecutionConfig) -> Result<Self, SystemError> {
        config.validate()?;
        Ok(Self {
            core: ManagerCore::new(config.period_s),
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                error: Mutex::new(None),
                callback: Mutex::new(Some(abort_on_error())),
                stats: Mutex::new(LoopStats::default()),
            }),
            period: Duration::from_secs_f64(config.period_s),
            thread_priority: config.thread_priority,
            thread: Mutex::new(None),
        })
    }

    /// 启动控制线程，阻塞直到线程报告已运行
    ///
    /// 已在运行时什么也不做。
    ///
    /// # 错误
    ///
    /// - [`SystemError::ErrorState`]: 处于错误状态，需先 [`clear_error`](Self::clear_error)
    /// - [`SystemError::Spawn`]: 无法创建线程
    pub fn start(&self) -> Result<(), SystemError> {
        let _guard = self.core.lock();
        if let Some(message) = self.error_message() {
            return Err(SystemError::ErrorState(message));
        }
        if self.is_running() {
            return Ok(());
        }

        let mut thread = self.thread.lock();
        if let Some(previous) = thread.take() {
            if previous.join().is_err() {
                warn!("Previous control thread had panicked");
            }
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        *self.shared.stats.lock() = LoopStats::default();

        let core = Arc::clone(&self.core);
        let shared = Arc::clone(&self.shared);
        let period = self.period;
        let raise_priority = self.thread_priority;
        let handle = std::thread::Builder::new()
            .name("barrett-rt-loop".into())
            .spawn(move || control_loop(core, shared, period, raise_priority))
            .map_err(SystemError::Spawn)?;
        *thread = Some(handle);
        drop(thread);

        let poll = self.period / 10;
        while !self.is_running() && !self.in_error_state() {
            if self.thread.lock().as_ref().is_none_or(|h| h.is_finished()) {
                break;
            }
            spin_sleep::sleep(poll);
        }
        Ok(())
    }

    /// 请求控制线程在下一个唤醒点退出并等待其结束
    ///
    /// 正在执行的周期会完整执行。可重复调用。不持有结构变更锁，
    /// 因此不能在持有该锁的线程上调用。
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            debug!("stop() called from the control thread; loop exits after this cycle");
            return;
        }
        if handle.join().is_err() {
            error!("Control thread panicked outside of an execution cycle");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn in_error_state(&self) -> bool {
        self.shared.error.lock().is_some()
    }

    /// 最近一次控制循环错误的描述
    pub fn error_message(&self) -> Option<String> {
        self.shared.error.lock().clone()
    }

    /// 清除错误状态，之后可以再次 [`start`](Self::start)
    pub fn clear_error(&self) {
        let _guard = self.core.lock();
        if let Some(message) = self.shared.error.lock().take() {
            info!("Cleared execution manager error: {}", message);
        }
    }

    /// 设置错误回调（替换默认的终止进程行为）
    pub fn set_error_callback(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.shared.callback.lock() = Some(Arc::new(callback));
    }

    /// 移除错误回调；之后出错只进入错误状态
    pub fn clear_error_callback(&self) {
        *self.shared.callback.lock() = None;
    }

    /// 当前（或最近一次运行的）周期统计
    pub fn statistics(&self) -> CycleStatistics {
        let _guard = self.core.lock();
        self.shared.stats.lock().snapshot(self.period)
    }
}

impl ExecutionManager for RealTimeExecutionManager {
    fn core(&self) -> &Arc<ManagerCore> {
        &self.core
    }
}

impl Drop for RealTimeExecutionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "realtime")]
fn raise_thread_priority() {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => {
            info!("Control thread priority set to MAX (realtime)");
        },
        Err(e) => {
            warn!(
                "Failed to set control thread priority: {}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            );
        },
    }
}

#[cfg(not(feature = "realtime"))]
fn raise_thread_priority() {
    debug!("Built without the `realtime` feature; control thread keeps default priority");
}

fn control_loop(
    core: Arc<ManagerCore>,
    shared: Arc<Shared>,
    period: Duration,
    raise_priority: bool,
) {
    if raise_priority {
        raise_thread_priority();
    }

    shared.running.store(true, Ordering::Release);
    info!("Real-time control loop started (period {:?})", period);

    let mut next_release = Instant::now() + period;
    while !shared.stop_requested.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_release {
            spin_sleep::sleep(next_release - now);
        } else {
            let missed = ((now - next_release).as_nanos() / period.as_nanos()) as u64;
            if missed > 0 {
                next_release += period.saturating_mul(u32::try_from(missed).unwrap_or(u32::MAX));
                shared.stats.lock().add_missed(missed);
            }
        }
        if shared.stop_requested.load(Ordering::Acquire) {
            break;
        }

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| core.run_execution_cycle()));
        shared.stats.lock().record(start.elapsed(), period);

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(SystemError::Panic(panic_message(payload.as_ref())).to_string()),
        };
        if let Some(message) = failure {
            error!("Control loop halted: {}", message);
            shared.enter_error(message);
            break;
        }

        next_release += period;
    }

    shared.running.store(false, Ordering::Release);
    let stats = shared.stats.lock().snapshot(period);
    info!(
        "Real-time control loop exited: {} cycles, cycle time min/mean/max/stdev = {:.1}/{:.1}/{:.1}/{:.1} us, {} missed release points, {} overruns",
        stats.loop_count,
        stats.min_us,
        stats.mean_us,
        stats.max_us,
        stats.stdev_us,
        stats.missed_release_points,
        stats.overruns
    );
}
