use crate::image::{ImageTransforms, MODEL_INPUT_SIZE};
use crate::models::backend::{ModelLoader, ScreeningModel};
use crate::utils::error::ScreeningError;
use crate::Result;
use ndarray::Array4;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// 模型生命周期：Unloaded → Loading → Ready | Failed
///
/// Ready 与 Failed 在进程生命周期内都是终态，失败后需重启进程才能重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ModelState {
    Unloaded = 0,
    Loading = 1,
    Ready = 2,
    Failed = 3,
}

impl ModelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ModelState::Unloaded,
            1 => ModelState::Loading,
            2 => ModelState::Ready,
            _ => ModelState::Failed,
        }
    }
}

/// 引擎统计信息
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub state: ModelState,
    pub load_count: usize,
    pub load_time_ms: u64,
    pub warmup_time_ms: u64,
}

/// 进程内唯一的推理引擎，持有共享模型
///
/// 状态标志无锁读取；互斥锁只保护 Unloaded → Loading 的加载临界区，
/// 模型就绪后的并发预测不经过该锁。
pub struct InferenceEngine {
    loader: Box<dyn ModelLoader>,
    state: AtomicU8,
    load_lock: Mutex<()>,
    model: OnceCell<Arc<dyn ScreeningModel>>,
    last_error: Mutex<Option<String>>,
    load_count: AtomicUsize,
    load_time_ms: AtomicU64,
    warmup_time_ms: AtomicU64,
    background: Mutex<Option<JoinHandle<ModelState>>>,
}

impl InferenceEngine {
    pub fn new(loader: Box<dyn ModelLoader>) -> Self {
        Self {
            loader,
            state: AtomicU8::new(ModelState::Unloaded as u8),
            load_lock: Mutex::new(()),
            model: OnceCell::new(),
            last_error: Mutex::new(None),
            load_count: AtomicUsize::new(0),
            load_time_ms: AtomicU64::new(0),
            warmup_time_ms: AtomicU64::new(0),
            background: Mutex::new(None),
        }
    }

    /// 当前状态，不阻塞
    pub fn status(&self) -> ModelState {
        ModelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ModelState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// 启动后台加载线程；已启动或状态已离开 Unloaded 时不做任何事
    pub fn start_background_load(self: &Arc<Self>) -> Result<()> {
        let mut background = self.background.lock();
        if background.is_some() || self.status() != ModelState::Unloaded {
            tracing::debug!("Background model load already started, state={:?}", self.status());
            return Ok(());
        }

        let engine = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || engine.load_if_unloaded())?;
        *background = Some(handle);

        tracing::info!("Background model load started: {}", self.loader.describe());
        Ok(())
    }

    /// 等待后台加载线程结束并返回其观察到的状态
    pub fn join_background_load(&self) -> Option<ModelState> {
        let handle = self.background.lock().take()?;
        match handle.join() {
            Ok(state) => Some(state),
            Err(_) => {
                tracing::error!("Background model loader thread panicked");
                Some(ModelState::Failed)
            }
        }
    }

    /// 确保模型可用，必要时同步加载
    ///
    /// Ready 走无锁快路径；否则加锁后复查状态（双重检查），仍为 Unloaded 才真正加载。
    /// 加载中的调用方会阻塞在同一把锁上，直到加载结束。
    pub fn ensure_ready(&self) -> bool {
        match self.status() {
            ModelState::Ready => return true,
            ModelState::Failed => return false,
            ModelState::Unloaded | ModelState::Loading => {}
        }
        self.load_if_unloaded() == ModelState::Ready
    }

    fn load_if_unloaded(&self) -> ModelState {
        let _guard = self.load_lock.lock();

        let current = self.status();
        if current != ModelState::Unloaded {
            return current;
        }

        self.set_state(ModelState::Loading);
        self.load_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!("Loading model: {}", self.loader.describe());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.load_and_warm_up()))
            .unwrap_or_else(|_| {
                Err(ScreeningError::ModelLoad("model loader panicked".to_string()))
            });

        match outcome {
            Ok(model) => {
                // 加锁期间只会设置一次
                let _ = self.model.set(model);
                self.set_state(ModelState::Ready);
                tracing::info!(
                    "Model ready: load={}ms, warmup={}ms",
                    self.load_time_ms.load(Ordering::Relaxed),
                    self.warmup_time_ms.load(Ordering::Relaxed)
                );
            }
            Err(e) => {
                tracing::error!("Model failed to load: {}", e);
                *self.last_error.lock() = Some(e.to_string());
                self.set_state(ModelState::Failed);
            }
        }

        self.status()
    }

    fn load_and_warm_up(&self) -> Result<Arc<dyn ScreeningModel>> {
        let load_start = Instant::now();
        let model = self.loader.load()?;
        self.load_time_ms
            .store(load_start.elapsed().as_millis() as u64, Ordering::Relaxed);

        let warmup_start = Instant::now();
        let probability = model.predict(&ImageTransforms::random_input())?;
        self.warmup_time_ms
            .store(warmup_start.elapsed().as_millis() as u64, Ordering::Relaxed);
        tracing::debug!("Warm-up inference returned {:.4}", probability);

        Ok(model)
    }

    /// 在已就绪的模型上再跑一次随机输入推理
    pub fn warm_up(&self) -> Result<()> {
        let model = self.ready_model()?;
        let start = Instant::now();
        model.predict(&ImageTransforms::random_input())?;
        tracing::debug!("Warm-up inference took {}ms", start.elapsed().as_millis());
        Ok(())
    }

    /// 单次前向推理，仅在 Ready 状态下可用
    pub fn predict(&self, tensor: &Array4<f32>) -> Result<f32> {
        let model = self.ready_model()?;

        let side = MODEL_INPUT_SIZE as usize;
        if tensor.shape() != [1, side, side, 3] {
            return Err(ScreeningError::Inference(format!(
                "Expected input shape [1, {}, {}, 3], got {:?}",
                side,
                side,
                tensor.shape()
            )));
        }

        let probability = model.predict(tensor)?;
        if !probability.is_finite() {
            return Err(ScreeningError::Inference(format!(
                "Model produced a non-finite score: {}",
                probability
            )));
        }
        Ok(probability)
    }

    fn ready_model(&self) -> Result<&Arc<dyn ScreeningModel>> {
        if self.status() != ModelState::Ready {
            return Err(ScreeningError::ModelNotReady);
        }
        self.model.get().ok_or(ScreeningError::ModelNotReady)
    }

    /// 加载失败时的错误信息
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// 加载器实际执行的次数
    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            state: self.status(),
            load_count: self.load_count(),
            load_time_ms: self.load_time_ms.load(Ordering::Relaxed),
            warmup_time_ms: self.warmup_time_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ConstantModel(f32);

    impl ScreeningModel for ConstantModel {
        fn predict(&self, _input: &Array4<f32>) -> Result<f32> {
            Ok(self.0)
        }
    }

    struct TestLoader {
        fail: bool,
        loads: Arc<AtomicUsize>,
    }

    impl ModelLoader for TestLoader {
        fn load(&self) -> Result<Arc<dyn ScreeningModel>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ScreeningError::ModelLoad("weights missing".to_string()));
            }
            Ok(Arc::new(ConstantModel(0.25)))
        }

        fn describe(&self) -> String {
            "test".to_string()
        }
    }

    fn engine(fail: bool) -> (InferenceEngine, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let loader = TestLoader { fail, loads: Arc::clone(&loads) };
        (InferenceEngine::new(Box::new(loader)), loads)
    }

    #[test]
    fn starts_unloaded_and_refuses_predictions() {
        let (engine, loads) = engine(false);
        assert_eq!(engine.status(), ModelState::Unloaded);
        assert!(matches!(
            engine.predict(&ImageTransforms::random_input()),
            Err(ScreeningError::ModelNotReady)
        ));
        assert!(matches!(engine.warm_up(), Err(ScreeningError::ModelNotReady)));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ensure_ready_loads_once() {
        let (engine, loads) = engine(false);
        assert!(engine.ensure_ready());
        assert!(engine.ensure_ready());
        assert_eq!(engine.status(), ModelState::Ready);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(engine.load_count(), 1);

        let p = engine.predict(&ImageTransforms::random_input()).unwrap();
        assert!((p - 0.25).abs() < f32::EPSILON);
        assert!(engine.warm_up().is_ok());
    }

    #[test]
    fn failure_is_terminal() {
        let (engine, loads) = engine(true);
        assert!(!engine.ensure_ready());
        assert!(!engine.ensure_ready());
        assert_eq!(engine.status(), ModelState::Failed);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(engine.last_error().unwrap().contains("weights missing"));
    }

    #[test]
    fn rejects_wrongly_shaped_tensor() {
        let (engine, _) = engine(false);
        assert!(engine.ensure_ready());
        let tensor = Array4::<f32>::zeros((1, 32, 32, 3));
        assert!(matches!(engine.predict(&tensor), Err(ScreeningError::Inference(_))));
    }

    #[test]
    fn background_load_is_idempotent_and_joinable() {
        let (engine, loads) = engine(false);
        let engine = Arc::new(engine);
        engine.start_background_load().unwrap();
        engine.start_background_load().unwrap();
        assert_eq!(engine.join_background_load(), Some(ModelState::Ready));
        assert_eq!(engine.join_background_load(), None);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // 已就绪后再启动不会产生新线程
        engine.start_background_load().unwrap();
        assert_eq!(engine.join_background_load(), None);
    }

    #[test]
    fn panicking_loader_marks_engine_failed() {
        struct PanickingLoader;
        impl ModelLoader for PanickingLoader {
            fn load(&self) -> Result<Arc<dyn ScreeningModel>> {
                panic!("corrupt graph");
            }
            fn describe(&self) -> String {
                "panicking".to_string()
            }
        }

        let engine = InferenceEngine::new(Box::new(PanickingLoader));
        assert!(!engine.ensure_ready());
        assert_eq!(engine.status(), ModelState::Failed);
        assert!(engine.last_error().unwrap().contains("panicked"));
    }
}
