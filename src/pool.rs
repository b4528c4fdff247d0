// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接工作池
//!
//! 固定数量的工作槽位，每个槽位同一时刻最多处理一个连接。
//! 接收循环只负责 `accept` 与 `submit`，连接的读写全部在池中完成。
//!
//! 准入策略：
//! - [`AdmissionPolicy::Block`]：没有空闲槽位时 `submit` 一直等待，接收循环随之暂停。
//! - [`AdmissionPolicy::Reject`]：最多 `queue` 个连接可以排队等待槽位，再多的直接拒绝。

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, warn};
use tokio::sync::{Semaphore, TryAcquireError};

use crate::exception::Exception;

/// 槽位占满时新连接的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    Block,
    Reject { queue: usize },
}

pub struct WorkerPool {
    size: usize,
    slots: Arc<Semaphore>,
    /// 仅 `Reject` 策略使用，容量为槽位数加排队数
    admission: Option<(Arc<Semaphore>, usize)>,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(size: usize, policy: AdmissionPolicy) -> Self {
        let size = size.max(1);
        let admission = match policy {
            AdmissionPolicy::Block => None,
            AdmissionPolicy::Reject { queue } => {
                Some((Arc::new(Semaphore::new(size + queue)), size + queue))
            }
        };
        Self {
            size,
            slots: Arc::new(Semaphore::new(size)),
            admission,
            closed: AtomicBool::new(false),
        }
    }

    /// 把一个连接任务交给工作池。
    ///
    /// 返回 `Ok` 表示任务一定会被执行；返回错误时任务已被丢弃，调用方负责记录日志。
    pub async fn submit<F>(&self, id: u128, job: F) -> Result<(), Exception>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Exception::PoolShutdown);
        }

        let admission = match &self.admission {
            None => {
                let permit = match Arc::clone(&self.slots).acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return Err(Exception::PoolShutdown),
                };
                debug!("[ID{}]已分配工作槽位", id);
                tokio::spawn(async move {
                    job.await;
                    drop(permit);
                });
                return Ok(());
            }
            Some((admission, _)) => admission,
        };

        let ticket = match Arc::clone(admission).try_acquire_owned() {
            Ok(t) => t,
            Err(TryAcquireError::NoPermits) => return Err(Exception::PoolSaturated),
            Err(TryAcquireError::Closed) => return Err(Exception::PoolShutdown),
        };
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            let permit = match slots.acquire_owned().await {
                Ok(p) => p,
                Err(_) => {
                    warn!("[ID{}]工作池已关闭，排队中的连接被丢弃", id);
                    return;
                }
            };
            debug!("[ID{}]已分配工作槽位", id);
            job.await;
            drop(permit);
            drop(ticket);
        });
        Ok(())
    }

    /// 停止接收新任务，并等待所有已提交的任务完成。
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // 排队中的任务持有准入票据，票据全部收回即代表排队与执行都已结束
        let tickets = match &self.admission {
            Some((admission, capacity)) => admission.acquire_many(*capacity as u32).await.ok(),
            None => None,
        };
        let drained = self.slots.acquire_many(self.size as u32).await.ok();
        debug!("工作池中的全部任务已结束");
        self.slots.close();
        if let Some((admission, _)) = &self.admission {
            admission.close();
        }
        drop(drained);
        drop(tickets);
    }

    /// 正在处理连接的槽位数
    pub fn active(&self) -> usize {
        self.size.saturating_sub(self.slots.available_permits())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
