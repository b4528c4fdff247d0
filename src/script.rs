// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 脚本引擎
//!
//! 动态资源通过一个很窄的能力接口执行：传入一条输入记录，取回一条输出记录。
//! 输出记录中的 `output` 键是响应体，其余键都是原样的响应标头。
//!
//! 默认实现 [`LuaInterpreter`] 为每次调用启动一个全新的 Lua 解释器进程，
//! 因此不同请求之间不会共享任何全局状态。生成的代码块从标准输入送入解释器：
//! 1. 前导部分构建 `request` 表、空的 `response` 表以及 `helper.print`。
//! 2. 用 `dofile` 执行用户脚本。
//! 3. 结尾部分把响应体原样写在两个分隔标记之间，再把其余标头与响应体长度以 JSON 对象写出。
//!
//! 响应体按字节传递，不要求是合法的 UTF-8。

use std::{
    collections::BTreeMap,
    io::Write,
    path::Path,
    process::{Command, Stdio},
};

use bytes::Bytes;
use log::{debug, error, warn};
use regex::Regex;
use serde_derive::Deserialize;

use crate::{exception::Exception, param::SCRIPT_OUTPUT_KEY};

/// 脚本的输入记录，也用于输出中的标头部分
pub type ScriptRecord = BTreeMap<String, String>;

/// 脚本执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    /// 除 `output` 以外 `response` 表中的所有字符串键
    pub headers: ScriptRecord,
    pub body: Bytes,
}

/// 包围响应体的分隔标记
const RESPONSE_MARKER: &str = "\n--naive-webserver-response--\n";

#[derive(Deserialize)]
struct Trailer {
    #[serde(default)]
    headers: ScriptRecord,
    length: usize,
}

#[cfg_attr(test, mockall::automock)]
pub trait ScriptEngine: Send + Sync {
    /// 以 `input` 为 `request` 表执行 `source`，返回脚本填写的 `response` 表。
    fn execute(&self, source: &Path, input: &ScriptRecord) -> Result<ScriptOutput, Exception>;
}

/// 通过外部 `lua` 可执行文件运行脚本
#[derive(Debug, Clone)]
pub struct LuaInterpreter {
    interpreter: String,
}

impl LuaInterpreter {
    pub fn new(interpreter: &str) -> Self {
        Self {
            interpreter: interpreter.to_string(),
        }
    }

    /// 探测解释器版本，找不到解释器时返回 `None`。
    pub fn probe_version(&self) -> Option<String> {
        let output = match Command::new(&self.interpreter).arg("-v").output() {
            Ok(o) => o,
            Err(e) => {
                debug!("无法启动Lua解释器{}: {}", self.interpreter, e);
                return None;
            }
        };
        // Lua 5.1 把版本信息写到 stderr，之后的版本写到 stdout
        let text = [
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        ]
        .concat();
        let re = Regex::new(r"Lua(?:JIT)? (\d+\.\d+(?:\.\d+)?)").ok()?;
        re.captures(&text)
            .and_then(|capture| capture.get(1))
            .map(|version| version.as_str().to_string())
    }
}

impl ScriptEngine for LuaInterpreter {
    fn execute(&self, source: &Path, input: &ScriptRecord) -> Result<ScriptOutput, Exception> {
        let source = match source.to_str() {
            Some(s) => s,
            None => {
                error!("脚本路径{}不是合法的UTF-8", source.display());
                return Err(Exception::ScriptExecuteFailed);
            }
        };
        let chunk = build_chunk(source, input);

        let mut child = match Command::new(&self.interpreter)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                error!("无法启动Lua解释器{}: {}", self.interpreter, e);
                return Err(Exception::ScriptExecuteFailed);
            }
        };

        // 解释器读完整个代码块之后才开始执行，先写完再等待输出不会死锁
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(chunk.as_bytes()) {
                error!("向Lua解释器写入代码失败: {}", e);
                let _ = child.kill();
                let _ = child.wait();
                return Err(Exception::ScriptExecuteFailed);
            }
        }

        let output = match child.wait_with_output() {
            Ok(o) => o,
            Err(e) => {
                error!("等待Lua解释器退出失败: {}", e);
                return Err(Exception::ScriptExecuteFailed);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("Lua脚本{}执行出错：{}", source, stderr.trim_end());
            return Err(Exception::ScriptCodeError);
        }
        parse_output(&output.stdout)
    }
}

/// 组装送入解释器的完整代码块
fn build_chunk(source: &str, input: &ScriptRecord) -> String {
    let mut chunk = String::from("request = {}\n");
    for (key, value) in input {
        chunk.push_str(&format!(
            "request[{}] = {}\n",
            lua_string_literal(key),
            lua_string_literal(value)
        ));
    }
    chunk.push_str(
        r##"response = {}
helper = {}
helper.print = function(...)
    for i = 1, select("#", ...) do
        local s = tostring((select(i, ...)))
        if response.output ~= nil and #response.output > 0 then
            response.output = response.output .. "\t" .. s
        else
            response.output = (response.output or "") .. s
        end
    end
end
"##,
    );
    chunk.push_str(&format!("dofile({})\n", lua_string_literal(source)));
    // 响应体原样夹在两个分隔标记之间，标头与响应体长度放在最后的 JSON 中
    chunk.push_str(&format!(
        r##"if type(response) ~= "table" then
    io.stderr:write("variable 'response' is not a table\n")
    os.exit(3)
end
local function quote(s)
    return '"' .. s:gsub('[%c"\\]', function(c) return string.format("\\u%04x", c:byte()) end) .. '"'
end
local body = response[{key}]
if type(body) == "number" then body = tostring(body) end
if type(body) ~= "string" then body = "" end
local parts = {{}}
for k, v in pairs(response) do
    if type(k) == "string" and k ~= {key} and (type(v) == "string" or type(v) == "number") then
        parts[#parts + 1] = quote(k) .. ":" .. quote(tostring(v))
    end
end
io.write({marker}, body, {marker}, '{{"headers":{{', table.concat(parts, ","), '}},"length":', #body, "}}")
"##,
        key = lua_string_literal(SCRIPT_OUTPUT_KEY),
        marker = lua_string_literal(RESPONSE_MARKER)
    ));
    chunk
}

/// 把任意字节序列写成 Lua 字符串字面量，除常见安全字符外一律使用 `\ddd` 转义
fn lua_string_literal(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for &byte in value.as_bytes() {
        if byte.is_ascii_alphanumeric() || b" -_./:,=+*;".contains(&byte) {
            literal.push(byte as char);
        } else {
            literal.push_str(&format!("\\{:03}", byte));
        }
    }
    literal.push('"');
    literal
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}

/// 解析解释器的标准输出：`<额外内容>MARKER<响应体>MARKER<JSON>`。
///
/// JSON 中没有原始换行，所以最后一个分隔标记一定在 JSON 之前；
/// 响应体的起点由 JSON 中的长度倒推，响应体中出现分隔标记也不影响解析。
fn parse_output(stdout: &[u8]) -> Result<ScriptOutput, Exception> {
    let marker = RESPONSE_MARKER.as_bytes();
    let trailer_at = match rfind(stdout, marker) {
        Some(index) => index,
        None => {
            error!("Lua脚本的输出中没有找到响应记录");
            return Err(Exception::ScriptOutputMalformed);
        }
    };
    let trailer: Trailer = match serde_json::from_slice(&stdout[trailer_at + marker.len()..]) {
        Ok(t) => t,
        Err(e) => {
            error!("无法解析Lua脚本的响应记录: {}", e);
            return Err(Exception::ScriptOutputMalformed);
        }
    };

    let body_at = match trailer_at
        .checked_sub(trailer.length)
        .and_then(|body_at| body_at.checked_sub(marker.len()).map(|m| (m, body_at)))
    {
        Some((marker_at, body_at)) if &stdout[marker_at..body_at] == marker => {
            if marker_at > 0 {
                warn!(
                    "Lua脚本向标准输出写入了{}字节的额外内容，已忽略",
                    marker_at
                );
            }
            body_at
        }
        _ => {
            error!("Lua脚本的响应体长度与输出不符");
            return Err(Exception::ScriptOutputMalformed);
        }
    };

    Ok(ScriptOutput {
        headers: trailer.headers,
        body: Bytes::copy_from_slice(&stdout[body_at..trailer_at]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// 按解释器的输出格式拼出标准输出
    fn stdout_of(stray: &[u8], body: &[u8], headers: &str) -> Vec<u8> {
        let mut stdout = stray.to_vec();
        stdout.extend_from_slice(RESPONSE_MARKER.as_bytes());
        stdout.extend_from_slice(body);
        stdout.extend_from_slice(RESPONSE_MARKER.as_bytes());
        stdout.extend_from_slice(
            format!("{{\"headers\":{{{}}},\"length\":{}}}", headers, body.len()).as_bytes(),
        );
        stdout
    }

    #[test]
    fn test_lua_string_literal() {
        assert_eq!(lua_string_literal("Host"), "\"Host\"");
        assert_eq!(lua_string_literal("a\"b"), "\"a\\034b\"");
        assert_eq!(lua_string_literal("\n"), "\"\\010\"");
        assert_eq!(lua_string_literal("中"), "\"\\228\\184\\173\"");
    }

    /// 转义后紧跟数字也不会产生歧义
    #[test]
    fn test_lua_string_literal_three_digit_escape() {
        assert_eq!(lua_string_literal("\"1"), "\"\\0341\"");
    }

    #[test]
    fn test_build_chunk() {
        let mut input = ScriptRecord::new();
        input.insert("http_version".to_string(), "HTTP/1.1".to_string());
        let chunk = build_chunk("/srv/www/index.lua", &input);

        assert!(chunk.starts_with("request = {}\n"));
        assert!(chunk.contains("request[\"http_version\"] = \"HTTP/1.1\"\n"));
        assert!(chunk.contains("dofile(\"/srv/www/index.lua\")"));
        assert!(chunk.contains("for i = 1, select(\"#\", ...) do"));
        assert!(chunk.contains("local body = response[\"output\"]"));
        assert!(!chunk.contains(RESPONSE_MARKER));
    }

    #[test]
    fn test_parse_output() {
        let stdout = stdout_of(b"stray text", b"hi", "\"Content-Type\":\"text/plain\"");
        let output = parse_output(&stdout).unwrap();
        assert_eq!(output.body, Bytes::from_static(b"hi"));
        assert_eq!(
            output.headers.get("Content-Type").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn test_parse_output_binary_body() {
        let body = b"\x89PNG\r\n\x1a\n\xff\xd8\x00";
        let output = parse_output(&stdout_of(b"", body, "")).unwrap();
        assert_eq!(&output.body[..], &body[..]);
        assert!(output.headers.is_empty());
    }

    #[test]
    fn test_parse_output_body_contains_marker() {
        let body = [b"a".as_slice(), RESPONSE_MARKER.as_bytes(), b"b".as_slice()].concat();
        let output = parse_output(&stdout_of(RESPONSE_MARKER.as_bytes(), &body, "")).unwrap();
        assert_eq!(&output.body[..], &body[..]);
    }

    #[test]
    fn test_parse_output_escaped_headers() {
        let stdout = stdout_of(b"", b"", "\"X-Tab\":\"a\\u0009b\"");
        let output = parse_output(&stdout).unwrap();
        assert_eq!(output.headers["X-Tab"], "a\tb");
        assert!(output.body.is_empty());
    }

    #[test]
    fn test_parse_output_without_marker() {
        assert_eq!(
            parse_output(b"{\"headers\":{},\"length\":0}"),
            Err(Exception::ScriptOutputMalformed)
        );
    }

    #[test]
    fn test_parse_output_invalid_json() {
        let stdout = format!("{}{}{{\"headers\":", RESPONSE_MARKER, RESPONSE_MARKER);
        assert_eq!(
            parse_output(stdout.as_bytes()),
            Err(Exception::ScriptOutputMalformed)
        );
    }

    #[test]
    fn test_parse_output_length_mismatch() {
        let stdout = format!(
            "{}hi{}{{\"headers\":{{}},\"length\":9}}",
            RESPONSE_MARKER, RESPONSE_MARKER
        );
        assert_eq!(
            parse_output(stdout.as_bytes()),
            Err(Exception::ScriptOutputMalformed)
        );
    }

    #[test]
    fn test_missing_interpreter() {
        let engine = LuaInterpreter::new("naive-webserver-no-such-interpreter");
        let result = engine.execute(Path::new("/tmp/x.lua"), &ScriptRecord::new());
        assert_eq!(result, Err(Exception::ScriptExecuteFailed));
        assert_eq!(engine.probe_version(), None);
    }

    fn run_lua(code: &str, input: &ScriptRecord) -> Result<ScriptOutput, Exception> {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("test.lua");
        fs::write(&script, code).unwrap();
        LuaInterpreter::new("lua").execute(&script, input)
    }

    #[test]
    #[ignore] // 需要系统中安装lua解释器
    fn test_lua_helper_print() {
        let mut input = ScriptRecord::new();
        input.insert("http_version".to_string(), "HTTP/1.1".to_string());
        let output = run_lua(
            "helper.print('a', 1) helper.print(request.http_version) response['X-Test'] = 'yes'",
            &input,
        )
        .unwrap();

        assert_eq!(output.body, Bytes::from_static(b"a\t1\tHTTP/1.1"));
        assert_eq!(output.headers["X-Test"], "yes");
        assert!(!output.headers.contains_key("output"));
    }

    #[test]
    #[ignore] // 需要系统中安装lua解释器
    fn test_lua_binary_body() {
        let output = run_lua(
            "io.write('noise') response.output = '\\137PNG\\255\\216\\000'",
            &ScriptRecord::new(),
        )
        .unwrap();
        assert_eq!(output.body, Bytes::from_static(b"\x89PNG\xff\xd8\x00"));
    }

    #[test]
    #[ignore] // 需要系统中安装lua解释器
    fn test_lua_runtime_error() {
        let result = run_lua("error('boom')", &ScriptRecord::new());
        assert_eq!(result, Err(Exception::ScriptCodeError));
    }

    #[test]
    #[ignore] // 需要系统中安装lua解释器
    fn test_lua_response_not_table() {
        let result = run_lua("response = 42", &ScriptRecord::new());
        assert_eq!(result, Err(Exception::ScriptCodeError));
    }

    #[test]
    #[ignore] // 需要系统中安装lua解释器
    fn test_lua_binary_safe_input() {
        let mut input = ScriptRecord::new();
        input.insert("X-Quote".to_string(), "\"tab\there\"\\".to_string());
        let output = run_lua("response.output = request['X-Quote']", &input).unwrap();
        assert_eq!(output.body, Bytes::from_static(b"\"tab\there\"\\"));
    }
}
