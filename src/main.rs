// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 朴素 Web 服务器
//!
//! 一个连接只处理一个请求的 HTTP/1.x 服务器：
//! - 静态文件与单段 `Range` 请求
//! - 通过外部 Lua 解释器执行的动态页面
//! - 目录首页回退与目录列表
//! - 固定大小的工作池与可配置的准入策略
//! - 后台管理控制台（CLI 指令交互）

use std::{process, sync::Arc};

use log::{error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{io::BufReader, runtime::Builder};

use naive_webserver::{
    config::Config,
    script::LuaInterpreter,
    server::{console, Server},
};

fn init_logger() {
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        // 没有日志配置文件时退回到只输出到控制台
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
            )))
            .build();
        let fallback = log4rs::Config::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));
        match fallback {
            Ok(config) => {
                let _ = log4rs::init_config(config);
                warn!("无法载入日志配置文件：{}，使用默认控制台日志", e);
            }
            Err(e) => eprintln!("无法初始化日志系统：{}", e),
        }
    }
}

fn main() {
    init_logger();

    let config = Config::from_toml("config/development.toml");
    info!("配置文件已载入");
    info!("www root: {}", config.www_root());

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(r) => r,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            process::exit(1);
        }
    };

    let interpreter = LuaInterpreter::new(config.lua_interpreter());
    match interpreter.probe_version() {
        Some(version) => info!("找到Lua解释器，版本：{}", version),
        None => warn!("无法找到Lua解释器。服务器将继续运行，但动态页面请求将返回500。"),
    }

    runtime.block_on(async move {
        let server = match Server::bind(&config, Arc::new(interpreter)) {
            Ok(s) => s,
            Err(e) => {
                error!("无法绑定端口：{}，错误：{}", config.port(), e);
                process::exit(1);
            }
        };
        let handle = server.handle();

        tokio::spawn(console(BufReader::new(tokio::io::stdin()), handle.clone()));
        tokio::spawn({
            let handle = handle.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("收到Ctrl-C，开始停机");
                    handle.stop();
                }
            }
        });

        server.run().await;
    });
    // 控制台任务可能仍阻塞在标准输入上，不等待它结束
    runtime.shutdown_background();
}
