// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器主体
//!
//! 单一接收循环负责 `accept` 并把连接交给 [`WorkerPool`]。
//! 每个连接只处理一个请求：读取标头块、解析、分发、发送响应，然后关闭。
//!
//! 停机流程：[`ServerHandle::stop`] 唤醒接收循环，循环退出后等待池中所有连接处理完毕。

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpSocket},
    sync::Notify,
};

use crate::{
    config::Config,
    dispatcher::Dispatcher,
    exception::Exception,
    pool::WorkerPool,
    reader::recv_header,
    request::Request,
    resolver::FsResolver,
    response::Response,
    script::ScriptEngine,
};

/// `accept` 失败后（例如文件描述符耗尽）重试前的等待时间
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    pool: Arc<WorkerPool>,
    shutdown: Arc<Notify>,
    max_header_size: usize,
}

/// 在服务器运行期间用于查询状态与发出停机信号
#[derive(Clone)]
pub struct ServerHandle {
    pool: Arc<WorkerPool>,
    shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    pub fn active(&self) -> usize {
        self.pool.active()
    }

    pub fn capacity(&self) -> usize {
        self.pool.size()
    }
}

impl Server {
    /// 按配置绑定监听端口，设置 `SO_REUSEADDR` 与有界的 backlog。
    ///
    /// 必须在 Tokio 运行时中调用。
    pub fn bind(config: &Config, engine: Arc<dyn ScriptEngine>) -> io::Result<Self> {
        let address = match config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket_address = SocketAddr::V4(SocketAddrV4::new(address, config.port()));
        info!("服务端将在{}上监听Socket连接", socket_address);

        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(socket_address)?;
        let listener = socket.listen(config.backlog())?;
        info!(
            "端口{}绑定完成，backlog为{}",
            listener.local_addr()?.port(),
            config.backlog()
        );

        let resolver = Arc::new(FsResolver::new(config.www_root(), config.script_extension()));
        let pool = WorkerPool::new(config.max_connections(), config.admission_policy());
        info!(
            "工作池大小为{}，准入策略为{:?}",
            pool.size(),
            config.admission_policy()
        );

        Ok(Self {
            listener,
            dispatcher: Arc::new(Dispatcher::new(resolver, engine)),
            pool: Arc::new(pool),
            shutdown: Arc::new(Notify::new()),
            max_header_size: config.max_header_size(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            pool: Arc::clone(&self.pool),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// 运行接收循环，直到收到停机信号，并等待所有进行中的连接结束。
    pub async fn run(self) {
        let mut id: u128 = 0;
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("接收循环收到停机指令，正在退出...");
                    break;
                }
                accepted = self.listener.accept() => accepted,
            };
            let (mut stream, addr) = match accepted {
                Ok(a) => a,
                Err(e) => {
                    error!("接受TCP连接失败：{}，{}ms后重试", e, ACCEPT_BACKOFF.as_millis());
                    if backoff(&self.shutdown, ACCEPT_BACKOFF).await {
                        info!("接收循环收到停机指令，正在退出...");
                        break;
                    }
                    continue;
                }
            };
            debug!("[ID{}]TCP连接已建立：{}", id, addr);

            let dispatcher = Arc::clone(&self.dispatcher);
            let max_header_size = self.max_header_size;
            let job = async move {
                handle_connection(&mut stream, id, &dispatcher, max_header_size).await;
            };
            match self.pool.submit(id, job).await {
                Ok(()) => {}
                Err(Exception::PoolSaturated) => {
                    warn!("[ID{}]工作池已满，拒绝来自{}的连接", id, addr);
                }
                Err(e) => {
                    warn!("[ID{}]无法提交来自{}的连接：{}", id, addr, e);
                }
            }
            id += 1;
        }

        self.pool.shutdown().await;
        info!("所有进行中的连接均已处理完毕，服务器停止");
    }
}

/// 等待 `delay`，期间收到停机信号则提前返回 `true`
async fn backoff(shutdown: &Notify, delay: Duration) -> bool {
    tokio::select! {
        _ = shutdown.notified() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// 处理单个连接上的唯一一次请求，最后关闭写端。
pub async fn handle_connection<S>(
    stream: &mut S,
    id: u128,
    dispatcher: &Dispatcher,
    max_header_size: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin + ?Sized,
{
    let mut raw = Vec::new();
    if let Err(e) = recv_header(stream, &mut raw, max_header_size).await {
        match e {
            Exception::StreamError => return,
            _ if raw.is_empty() => {
                debug!("[ID{}]客户端未发送任何数据即关闭连接", id);
                return;
            }
            _ => {
                warn!("[ID{}]HTTP标头读取不完整（{}），返回400", id, e);
                let mut response = Response::from_exception(e);
                if response.send_to(stream, id).await.is_ok() {
                    let _ = stream.shutdown().await;
                }
                return;
            }
        }
    }
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();
    let mut response = match Request::try_from(&raw, id) {
        Ok(request) => {
            let response = dispatcher.dispatch(&request, id).await;
            info!(
                "[ID{}] {}, {}, {}, {}, {}, {}, ",
                id,
                request.version(),
                request.path(),
                request.method(),
                response.status_code(),
                response.information(),
                request.user_agent(),
            );
            response
        }
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败（{}），返回400", id, e);
            Response::from_exception(e)
        }
    };
    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );

    if response.send_to(stream, id).await.is_ok() {
        let _ = stream.shutdown().await;
    }
}

/// 后台管理控制台，从 `reader` 逐行读取运维指令。输入结束时返回。
pub async fn console<R>(reader: R, handle: ServerHandle)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("读取控制台输入失败：{}", e);
                break;
            }
        };
        match line.trim() {
            "stop" => {
                handle.stop();
                println!("停机指令已激活，服务器将在处理完进行中的连接后关闭...");
                break;
            }
            "help" => {
                println!("== Webserver Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                println!("== Webserver 状态 ===");
                println!(
                    "当前活跃连接数: {}/{}",
                    handle.active(),
                    handle.capacity()
                );
                println!("====================");
            }
            "" => {}
            cmd => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}
