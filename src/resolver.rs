// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 资源解析
//!
//! 将解码后的请求路径映射为静态资源、动态（脚本）资源或不存在。
//!
//! 规则：
//! 1. `root + path` 是一个存在的文件：以脚本扩展名结尾则为动态资源，否则为静态资源。
//! 2. 否则检查 `root + path + ".lua"`，存在则为动态资源。
//! 3. 都不存在即为 `NotFound`。
//!
//! 目录不算作资源，目录请求由分发器的首页回退逻辑处理。
//! 每次解析都直接查询文件系统，结果不做缓存。

use std::path::{Path, PathBuf};

use log::debug;

/// 解析结果，携带在文件系统中的实际路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Static(PathBuf),
    Dynamic(PathBuf),
    NotFound,
}

/// 路由策略的替换点。实现者只能做存在性检查，不应读取文件内容。
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, path: &str) -> ResourceKind;

    /// 将请求路径映射到文件系统路径，不检查是否存在
    fn real_path(&self, path: &str) -> PathBuf;
}

/// 基于文档根目录与单一脚本扩展名的默认解析器
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
    script_suffix: String,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>, script_extension: &str) -> Self {
        Self {
            root: root.into(),
            script_suffix: format!(".{}", script_extension.trim_start_matches('.')),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_script(&self, path: &str) -> bool {
        path.ends_with(&self.script_suffix)
    }
}

impl ResourceResolver for FsResolver {
    fn resolve(&self, path: &str) -> ResourceKind {
        let literal = self.real_path(path);
        if literal.is_file() {
            debug!("路径{}映射到已存在的文件{}", path, literal.display());
            return match self.is_script(path) {
                true => ResourceKind::Dynamic(literal),
                false => ResourceKind::Static(literal),
            };
        }

        let script = self.real_path(&[path, &self.script_suffix].concat());
        if script.is_file() {
            debug!("路径{}映射到脚本{}", path, script.display());
            return ResourceKind::Dynamic(script);
        }
        ResourceKind::NotFound
    }

    fn real_path(&self, path: &str) -> PathBuf {
        // 去除开头的 '/' 以便进行路径拼接
        self.root.join(path.trim_start_matches('/'))
    }
}
