use crate::utils::error::ScreeningError;
use crate::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件路径
    pub model_path: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// 允许的跨域来源（前端地址）
    pub cors_origin: String,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Config {
    pub fn new(
        bind_addr: String,
        model_path: String,
        workers: Option<usize>,
        cors_origin: String,
        dev_mode: bool,
    ) -> Result<Self> {
        if model_path.trim().is_empty() {
            return Err(ScreeningError::Config("Model path cannot be empty".to_string()));
        }

        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores).max(1);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 使用75%的CPU核心
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 50 * 1024 * 1024, // 50MB
        };

        Ok(Self {
            bind_addr,
            model_path: PathBuf::from(model_path),
            workers,
            dev_mode,
            cors_origin,
            onnx_config,
            server_config,
        })
    }

    /// 测试与嵌入场景使用的默认配置
    pub fn for_model(model_path: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            model_path: model_path.into(),
            workers: 1,
            dev_mode: true,
            cors_origin: "http://localhost:5173".to_string(),
            onnx_config: OnnxConfig {
                intra_threads: 1,
                optimization_level: 3,
            },
            server_config: ServerConfig {
                request_timeout: 60,
                max_request_size: 50 * 1024 * 1024,
            },
        }
    }
}
