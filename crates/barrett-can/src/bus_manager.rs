//! 总线管理器
//!
//! 同一条总线上同时存在多个请求方（控制线程、诊断线程），应答会交错到达。
//! `BusManager` 把收到的帧按总线 ID 放进各自的队列，
//! `receive(expected)` 只取自己期望的那一类，其它帧留给对应的请求方。

use crate::{BarrettFrame, CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, CommunicationsBus};
use barrett_protocol::{
    MAX_ID, Property, PuckType, encode_get_request, property_id, standard_reply_bus_id,
};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// 总线配置
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// 普通阻塞接收的超时时间
    pub timeout: Duration,
    /// 实时阻塞接收的超时时间（控制周期内）
    pub realtime_timeout: Duration,
    /// 每个总线 ID 的缓存帧数上限
    pub buffer_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            realtime_timeout: Duration::from_millis(5),
            buffer_capacity: 64,
        }
    }
}

struct Inner {
    adapter: Box<dyn CanAdapter + Send>,
    buffers: HashMap<u32, VecDeque<BarrettFrame>>,
}

impl Inner {
    fn retrieve(&mut self, bus_id: u32) -> Option<BarrettFrame> {
        self.buffers.get_mut(&bus_id).and_then(VecDeque::pop_front)
    }

    fn store(&mut self, frame: BarrettFrame, capacity: usize) {
        let queue = self.buffers.entry(frame.id).or_default();
        if queue.len() >= capacity {
            warn!(
                "Receive buffer for bus ID 0x{:03X} is full ({} frames), dropping oldest frame",
                frame.id, capacity
            );
            queue.pop_front();
        }
        queue.push_back(frame);
    }

    /// 非阻塞地取空适配器的接收队列
    fn drain(&mut self, capacity: usize) -> Result<(), CanError> {
        while let Some(frame) = self.adapter.try_receive()? {
            trace!("Buffered CAN frame: ID=0x{:03X}, len={}", frame.id, frame.len);
            self.store(frame, capacity);
        }
        Ok(())
    }
}

/// 按总线 ID 分拣应答的总线实现
pub struct BusManager {
    transaction: ReentrantMutex<()>,
    inner: Mutex<Inner>,
    config: BusConfig,
}

impl BusManager {
    /// 使用默认配置创建
    pub fn new(adapter: impl CanAdapter + Send + 'static) -> Self {
        Self::with_config(adapter, BusConfig::default())
    }

    /// 使用指定配置创建
    pub fn with_config(adapter: impl CanAdapter + Send + 'static, config: BusConfig) -> Self {
        Self {
            transaction: ReentrantMutex::new(()),
            inner: Mutex::new(Inner {
                adapter: Box::new(adapter),
                buffers: HashMap::new(),
            }),
            config,
        }
    }

    /// 打开 SocketCAN 接口并创建总线管理器
    #[cfg(target_os = "linux")]
    pub fn open(interface: &str, config: BusConfig) -> Result<Self, CanError> {
        let adapter = crate::SocketCanAdapter::new(interface)?;
        Ok(Self::with_config(adapter, config))
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// 当前缓存的帧总数
    pub fn buffered_frames(&self) -> usize {
        self.inner.lock().buffers.values().map(VecDeque::len).sum()
    }

    /// 枚举总线上的节点
    ///
    /// 依次向 0..=31 号节点请求 STAT，返回在实时超时内应答的节点 ID。
    pub fn enumerate(&self) -> Result<Vec<u32>, CanError> {
        let stat = property_id(PuckType::Monitor, Property::Stat).map_err(|e| {
            CanError::Device(CanDeviceError::new(CanDeviceErrorKind::InvalidFrame, e.to_string()))
        })?;

        let _guard = self.transaction.lock();
        let mut found = Vec::new();
        for id in 0..=MAX_ID {
            let request = encode_get_request(id, stat);
            self.send(request.id, request.data_slice())?;
            match self.receive(standard_reply_bus_id(id), true, true) {
                Ok(Some(_)) => {
                    trace!("Found Puck ID={}", id);
                    found.push(id);
                },
                Ok(None) | Err(CanError::Timeout) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }
}

impl CommunicationsBus for BusManager {
    fn mutex(&self) -> &ReentrantMutex<()> {
        &self.transaction
    }

    fn send(&self, bus_id: u32, data: &[u8]) -> Result<(), CanError> {
        if data.len() > BarrettFrame::MAX_LEN {
            return Err(CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::InvalidFrame,
                format!("payload of {} bytes exceeds 8", data.len()),
            )));
        }

        let _guard = self.transaction.lock();
        let frame = BarrettFrame::new(bus_id, data);
        self.inner.lock().adapter.send(frame)
    }

    fn receive(
        &self,
        expected_bus_id: u32,
        blocking: bool,
        realtime: bool,
    ) -> Result<Option<BarrettFrame>, CanError> {
        let _guard = self.transaction.lock();
        let mut inner = self.inner.lock();
        let capacity = self.config.buffer_capacity;

        if let Some(frame) = inner.retrieve(expected_bus_id) {
            return Ok(Some(frame));
        }

        inner.drain(capacity)?;
        if let Some(frame) = inner.retrieve(expected_bus_id) {
            return Ok(Some(frame));
        }

        if !blocking {
            return Ok(None);
        }

        let timeout = if realtime {
            self.config.realtime_timeout
        } else {
            self.config.timeout
        };
        let deadline = Instant::now() + timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(CanError::Timeout);
            }

            let frame = inner.adapter.receive_timeout(deadline - now)?;
            if frame.id == expected_bus_id {
                return Ok(Some(frame));
            }
            inner.store(frame, capacity);
        }
    }
}
