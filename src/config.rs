// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;

use crate::pool::AdmissionPolicy;

/// 工作池占满时的准入方式
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    Block,
    Reject,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_www_root")]
    www_root: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default)]
    max_connections: usize,
    #[serde(default = "default_backlog")]
    backlog: u32,
    #[serde(default = "default_admission")]
    admission: Admission,
    #[serde(default = "default_admission_queue")]
    admission_queue: usize,
    #[serde(default = "default_script_extension")]
    script_extension: String,
    #[serde(default = "default_lua_interpreter")]
    lua_interpreter: String,
    #[serde(default = "default_max_header_size")]
    max_header_size: usize,
}

fn default_www_root() -> String {
    ".".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_local() -> bool {
    true
}

fn default_backlog() -> u32 {
    128
}

fn default_admission() -> Admission {
    Admission::Block
}

fn default_admission_queue() -> usize {
    64
}

fn default_script_extension() -> String {
    "lua".to_string()
}

fn default_lua_interpreter() -> String {
    "lua".to_string()
}

fn default_max_header_size() -> usize {
    8192 // 8KB
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            www_root: default_www_root(),
            port: default_port(),
            local: default_local(),
            worker_threads: 0,
            max_connections: 0,
            backlog: default_backlog(),
            admission: default_admission(),
            admission_queue: default_admission_queue(),
            script_extension: default_script_extension(),
            lua_interpreter: default_lua_interpreter(),
            max_header_size: default_max_header_size(),
        }
    }

    /// 读取配置文件。文件不存在或无法解析时使用默认配置。
    pub fn from_toml(filename: &str) -> Self {
        let mut str_val = String::new();
        let read = File::open(filename).and_then(|mut file| file.read_to_string(&mut str_val));
        let raw_config = match read {
            Ok(_) => Self::from_toml_str(&str_val),
            Err(e) => {
                error!("无法读取配置文件{}：{}，使用默认配置", filename, e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    fn from_toml_str(content: &str) -> Self {
        match toml::from_str(content) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        }
    }

    /// 把 0 值展开为 CPU 数量，并修正不可用的取值
    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.max_connections == 0 {
            self.max_connections = num_cpus::get();
        }
        if self.backlog == 0 {
            warn!("backlog被设置为0，该值将被改为{}。", default_backlog());
            self.backlog = default_backlog();
        }
        if self.max_header_size == 0 {
            warn!(
                "max_header_size被设置为0，该值将被改为{}。",
                default_max_header_size()
            );
            self.max_header_size = default_max_header_size();
        }
        self
    }

    /// 以代码方式构建配置，常用于测试
    pub fn with_root(mut self, www_root: &str) -> Self {
        self.www_root = www_root.to_string();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }
}

impl Config {
    pub fn www_root(&self) -> &str {
        &self.www_root
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn admission_queue(&self) -> usize {
        self.admission_queue
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        match self.admission {
            Admission::Block => AdmissionPolicy::Block,
            Admission::Reject => AdmissionPolicy::Reject {
                queue: self.admission_queue,
            },
        }
    }

    pub fn script_extension(&self) -> &str {
        &self.script_extension
    }

    pub fn lua_interpreter(&self) -> &str {
        &self.lua_interpreter
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }
}
