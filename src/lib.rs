// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

pub mod config;
pub mod dispatcher;
pub mod exception;
pub mod header;
pub mod param;
pub mod pool;
pub mod range;
pub mod reader;
pub mod request;
pub mod resolver;
pub mod response;
pub mod script;
pub mod server;
pub mod util;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use exception::Exception;
pub use param::{HttpRequestMethod, HttpStatus, HttpVersion};
pub use request::Request;
pub use resolver::{FsResolver, ResourceKind, ResourceResolver};
pub use response::Response;
pub use script::{LuaInterpreter, ScriptEngine, ScriptOutput, ScriptRecord};
pub use server::{Server, ServerHandle};
pub use util::HtmlBuilder;
