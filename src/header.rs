// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 有序的标头字段表，请求与响应共用。
//!
//! 字段名按收到（或设置）时的原样保存，大小写敏感；重复设置同名字段时保留首次出现的位置，
//! 值以最后一次为准。

/// 保持插入顺序的标头字段表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields {
    fields: Vec<(String, String)>,
}

impl HeaderFields {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// 设置字段。同名字段已存在时原地覆盖其值。
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    /// 按字段名精确查找
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// 忽略大小写查找。多个字段只在大小写上不同时，取最后设置的那个。
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.get_ignore_case(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(index).1)
    }

    /// 删除所有忽略大小写后同名的字段
    pub fn remove_ignore_case(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
