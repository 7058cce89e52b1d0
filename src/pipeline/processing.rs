// src/pipeline/processing.rs
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{ConfigurationError, ProcessingError};
use crate::events::{EventBuffer, NullConsumer, XmlConsumer, XmlEvent};
use crate::pipeline::chain::Chain;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{Environment, ExecutionStats, Parameters};
use crate::pipeline::error_handler::{ErrorHandler, Notification};
use crate::pipeline::registry::StageRegistry;
use crate::pipeline::stage::{
    Generator, Serializer, StageDeclaration, StageInstance, StageRole, Transformer,
};
use crate::pipeline::validity::Validity;

/// Where a pipeline is in its execution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Unprepared,
    Prepared,
    Connected,
    Executing,
    Completed,
    Failed,
}

/// Generator, transformers and serializer assembled into one event stream
///
/// One instance serves one request at a time. After an execution, `recycle`
/// releases every stage back to the registry and makes the instance reusable;
/// dropping the pipeline does the same.
pub struct ProcessingPipeline {
    registry: Arc<StageRegistry>,
    config: PipelineConfig,
    generator: Option<StageInstance<dyn Generator>>,
    transformers: Vec<StageInstance<dyn Transformer>>,
    serializer: Option<StageInstance<dyn Serializer>>,
    error_handler: Option<Box<dyn ErrorHandler>>,
    /// Owned substitute, set once a failure was recovered
    error_pipeline: Option<Box<ProcessingPipeline>>,
    notification: Option<Notification>,
    state: PipelineState,
    stats: ExecutionStats,
}

impl ProcessingPipeline {
    pub fn new(registry: Arc<StageRegistry>, config: PipelineConfig) -> Self {
        ProcessingPipeline {
            registry,
            config,
            generator: None,
            transformers: Vec::new(),
            serializer: None,
            error_handler: None,
            error_pipeline: None,
            notification: None,
            state: PipelineState::Unprepared,
            stats: ExecutionStats::default(),
        }
    }

    pub fn set_generator(&mut self, declaration: StageDeclaration) -> Result<(), ConfigurationError> {
        self.ensure_assembling(&declaration)?;
        if let Some(existing) = &self.generator {
            return Err(ConfigurationError::DuplicateStage {
                role: StageRole::Generator,
                kind: declaration.kind,
                existing: existing.declaration.kind.clone(),
                location: declaration.location,
            });
        }
        let instance = self
            .registry
            .lookup_generator(&declaration.kind, declaration.location.as_ref())?;
        self.generator = Some(StageInstance {
            role: StageRole::Generator,
            declaration,
            instance,
        });
        Ok(())
    }

    /// Append a transformer; the first one added sits closest to the generator
    pub fn add_transformer(&mut self, declaration: StageDeclaration) -> Result<(), ConfigurationError> {
        self.ensure_assembling(&declaration)?;
        let instance = self
            .registry
            .lookup_transformer(&declaration.kind, declaration.location.as_ref())?;
        self.transformers.push(StageInstance {
            role: StageRole::Transformer,
            declaration,
            instance,
        });
        Ok(())
    }

    pub fn set_serializer(&mut self, declaration: StageDeclaration) -> Result<(), ConfigurationError> {
        self.ensure_assembling(&declaration)?;
        if let Some(existing) = &self.serializer {
            return Err(ConfigurationError::DuplicateStage {
                role: StageRole::Serializer,
                kind: declaration.kind,
                existing: existing.declaration.kind.clone(),
                location: declaration.location,
            });
        }
        let instance = self
            .registry
            .lookup_serializer(&declaration.kind, declaration.location.as_ref())?;
        self.serializer = Some(StageInstance {
            role: StageRole::Serializer,
            declaration,
            instance,
        });
        Ok(())
    }

    pub fn set_error_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.error_handler = Some(handler);
    }

    /// Failure this pipeline renders when it runs as an error pipeline
    pub fn set_notification(&mut self, notification: Notification) {
        self.notification = Some(notification);
    }

    fn ensure_assembling(&self, declaration: &StageDeclaration) -> Result<(), ConfigurationError> {
        if self.state == PipelineState::Unprepared {
            Ok(())
        } else {
            Err(ConfigurationError::InvalidDeclaration {
                message: format!("cannot add '{}' to a pipeline that is already prepared", declaration.kind),
                location: declaration.location.clone(),
            })
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }

    pub fn transformer_count(&self) -> usize {
        self.transformers.len()
    }

    pub fn generator_kind(&self) -> Option<&str> {
        self.generator.as_ref().map(|g| g.declaration.kind.as_str())
    }

    /// The substitute that replaced this pipeline's output, if any
    pub fn error_pipeline(&self) -> Option<&ProcessingPipeline> {
        self.error_pipeline.as_deref()
    }

    /// Set up every stage: generator, transformers in order, serializer
    pub fn prepare(&mut self, env: &dyn Environment) -> Result<(), ProcessingError> {
        if self.state != PipelineState::Unprepared {
            return Err(ProcessingError::DuplicatePrepare);
        }
        tracing::debug!(
            generator = self.generator_kind().unwrap_or("-"),
            transformers = self.transformers.len(),
            "preparing pipeline"
        );

        match self.setup_stages(env.parameters()) {
            Ok(()) => {
                self.state = PipelineState::Prepared;
                Ok(())
            }
            Err(err) => match self.prepare_error_pipeline(env, &err) {
                Some(substitute) => {
                    tracing::info!("pipeline setup failed, using error pipeline: {}", err);
                    self.error_pipeline = Some(substitute);
                    self.state = PipelineState::Prepared;
                    Ok(())
                }
                None => {
                    self.state = PipelineState::Failed;
                    Err(err)
                }
            },
        }
    }

    fn setup_stages(&mut self, request: &Parameters) -> Result<(), ProcessingError> {
        let notification = self.notification.as_ref();
        if let Some(generator) = self.generator.as_mut() {
            generator.setup(request, notification)?;
        }
        for transformer in self.transformers.iter_mut() {
            transformer.setup(request, notification)?;
        }
        if let Some(serializer) = self.serializer.as_mut() {
            serializer.setup(request, notification)?;
        }
        Ok(())
    }

    fn ensure_prepared(&mut self, env: &dyn Environment) -> Result<(), ProcessingError> {
        match self.state {
            PipelineState::Unprepared => self.prepare(env),
            PipelineState::Prepared => Ok(()),
            other => Err(ProcessingError::InvalidState(format!(
                "pipeline is {:?}; recycle it before running it again",
                other
            ))),
        }
    }

    fn connect(&mut self) -> Result<(), ProcessingError> {
        if self.state != PipelineState::Prepared {
            return Err(ProcessingError::InvalidState(format!(
                "cannot connect a pipeline that is {:?}",
                self.state
            )));
        }
        tracing::debug!(
            generator = self.generator_kind().unwrap_or("-"),
            transformers = self.transformers.len(),
            serializer = self.serializer.as_ref().map(|s| s.declaration.kind.as_str()).unwrap_or("-"),
            "connecting pipeline"
        );
        self.state = PipelineState::Connected;
        Ok(())
    }

    /// Run the pipeline and write the serialized result to the environment
    ///
    /// Without a serializer the generator still runs but nothing is emitted.
    /// Any non-error return means complete success.
    pub fn process(&mut self, env: &mut dyn Environment) -> Result<bool, ProcessingError> {
        self.ensure_prepared(&*env)?;
        if let Some(substitute) = self.error_pipeline.as_mut() {
            let outcome = substitute.process(env);
            self.stats.substituted = true;
            self.stats.events += substitute.stats.events;
            self.stats.bytes_written += substitute.stats.bytes_written;
            return outcome;
        }
        if self.generator.is_none() {
            return Err(ProcessingError::IncompletePipeline("no generator set".to_string()));
        }
        self.connect()?;

        let start_time = Instant::now();
        self.state = PipelineState::Executing;
        let result = if self.serializer.is_some() {
            self.run_serialized(env)
        } else {
            self.run_internal()
        };
        self.stats.processing_time += start_time.elapsed();

        match result {
            Ok(()) => {
                self.state = PipelineState::Completed;
                tracing::debug!(
                    events = self.stats.events,
                    bytes = self.stats.bytes_written,
                    "pipeline completed"
                );
                Ok(true)
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                self.recover(env, err, |substitute, env| substitute.process(env))
            }
        }
    }

    /// Run the pipeline into an external consumer instead of the serializer
    ///
    /// With an error handler installed, events are captured and only replayed
    /// into `consumer` once generation succeeded.
    pub fn process_to(
        &mut self,
        env: &mut dyn Environment,
        consumer: &mut dyn XmlConsumer,
    ) -> Result<bool, ProcessingError> {
        self.ensure_prepared(&*env)?;
        if let Some(substitute) = self.error_pipeline.as_mut() {
            let outcome = substitute.process_to(env, consumer);
            self.stats.substituted = true;
            self.stats.events += substitute.stats.events;
            self.stats.bytes_written += substitute.stats.bytes_written;
            return outcome;
        }
        if self.generator.is_none() {
            return Err(ProcessingError::IncompletePipeline("no generator set".to_string()));
        }
        self.connect()?;

        let start_time = Instant::now();
        self.state = PipelineState::Executing;
        let result = if self.error_handler.is_some() {
            let mut capture = EventBuffer::new();
            drive(self.generator.as_mut(), &mut self.transformers, &mut capture)
                .map(|events| (events, Some(capture)))
        } else {
            drive(self.generator.as_mut(), &mut self.transformers, consumer)
                .map(|events| (events, None))
        };
        self.stats.processing_time += start_time.elapsed();

        match result {
            Ok((events, capture)) => {
                self.stats.events += events;
                if let Some(capture) = capture {
                    // Past this point the consumer may hold part of the output
                    if let Err(err) = capture.drain_into(consumer) {
                        self.state = PipelineState::Failed;
                        return Err(ProcessingError::from_stage(err));
                    }
                }
                self.state = PipelineState::Completed;
                Ok(true)
            }
            Err(err) => {
                self.state = PipelineState::Failed;
                self.recover(env, err, |substitute, env| substitute.process_to(env, consumer))
            }
        }
    }

    /// Connect the transformer chain to `sink` and hand out its entry point
    ///
    /// Used when a generator-less pipeline is embedded in a larger stream.
    pub fn entry_point<'a>(
        &'a mut self,
        sink: &'a mut dyn XmlConsumer,
    ) -> Result<Chain<'a>, ProcessingError> {
        if self.generator.is_some() {
            return Err(ProcessingError::InvalidState(
                "pipeline has a generator; run it with process_to".to_string(),
            ));
        }
        if self.state == PipelineState::Unprepared {
            return Err(ProcessingError::InvalidState(
                "prepare the pipeline before connecting it".to_string(),
            ));
        }
        self.connect()?;
        Ok(Chain::new(&mut self.transformers, sink))
    }

    fn run_internal(&mut self) -> Result<(), ProcessingError> {
        let mut sink = NullConsumer;
        self.stats.events += drive(self.generator.as_mut(), &mut self.transformers, &mut sink)?;
        Ok(())
    }

    fn run_serialized(&mut self, env: &mut dyn Environment) -> Result<(), ProcessingError> {
        let ProcessingPipeline {
            generator,
            transformers,
            serializer,
            config,
            error_handler,
            stats,
            ..
        } = self;
        let serializer = serializer
            .as_mut()
            .ok_or_else(|| ProcessingError::IncompletePipeline("no serializer set".to_string()))?;

        let set_length = serializer.instance.should_set_content_length();
        // Substitution is only possible while nothing has reached the destination
        let buffer_all = set_length || error_handler.is_some() || config.output_buffer_size.is_none();

        if buffer_all {
            let mut buffer = Vec::new();
            let mut sink = SerializerSink {
                serializer: serializer.instance.as_mut(),
                output: &mut buffer,
            };
            stats.events += drive(generator.as_mut(), transformers, &mut sink)?;

            if set_length {
                env.set_content_length(buffer.len());
            }
            let output = env.output();
            output.write_all(&buffer)?;
            output.flush()?;
            stats.bytes_written += buffer.len();
        } else {
            let capacity = config.output_buffer_size.unwrap_or_default();
            let mut writer = CountingWriter::new(BufWriter::with_capacity(capacity, env.output()));
            let mut sink = SerializerSink {
                serializer: serializer.instance.as_mut(),
                output: &mut writer,
            };
            match drive(generator.as_mut(), transformers, &mut sink) {
                Ok(events) => {
                    writer.flush()?;
                    stats.events += events;
                    stats.bytes_written += writer.count;
                }
                Err(err) => {
                    // Discard whatever is still buffered
                    let (_destination, _unflushed) = writer.inner.into_parts();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Swap in an error pipeline for `error`, or give the error back
    fn recover<F>(
        &mut self,
        env: &mut dyn Environment,
        error: ProcessingError,
        run: F,
    ) -> Result<bool, ProcessingError>
    where
        F: FnOnce(&mut ProcessingPipeline, &mut dyn Environment) -> Result<bool, ProcessingError>,
    {
        let Some(mut substitute) = self.prepare_error_pipeline(&*env, &error) else {
            return Err(error);
        };
        tracing::info!("pipeline execution failed, using error pipeline: {}", error);

        let outcome = run(&mut substitute, env);
        self.stats.substituted = true;
        self.stats.events += substitute.stats.events;
        self.stats.bytes_written += substitute.stats.bytes_written;
        self.error_pipeline = Some(substitute);

        match outcome {
            Ok(success) => Ok(success),
            Err(secondary) => {
                tracing::warn!("error pipeline failed as well: {}", secondary);
                Err(error)
            }
        }
    }

    /// Ask the error handler for a prepared replacement; any failure on the way yields `None`
    fn prepare_error_pipeline(
        &mut self,
        env: &dyn Environment,
        error: &ProcessingError,
    ) -> Option<Box<ProcessingPipeline>> {
        let handler = self.error_handler.as_mut()?;
        let mut substitute = match handler.prepare_error_pipeline(error) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => {
                tracing::debug!("error handler declined: {}", error);
                return None;
            }
            Err(secondary) => {
                tracing::warn!("failed to build error pipeline: {}", secondary);
                return None;
            }
        };
        if substitute.notification.is_none() {
            substitute.notification = Some(Notification::from_error(error));
        }
        if let Err(secondary) = substitute.prepare(env) {
            tracing::warn!("failed to prepare error pipeline: {}", secondary);
            return None;
        }
        Some(Box::new(substitute))
    }

    /// Serialized content type, honoring a declared override
    pub fn mime_type(&self) -> Option<&str> {
        if let Some(substitute) = &self.error_pipeline {
            return substitute.mime_type();
        }
        self.serializer.as_ref().map(|s| {
            s.declaration
                .mime_type
                .as_deref()
                .unwrap_or_else(|| s.instance.mime_type())
        })
    }

    pub fn should_set_content_length(&self) -> bool {
        if let Some(substitute) = &self.error_pipeline {
            return substitute.should_set_content_length();
        }
        self.serializer
            .as_ref()
            .map(|s| s.instance.should_set_content_length())
            .unwrap_or(false)
    }

    /// Ordered concatenation of the generator and transformer keys
    ///
    /// `None` if any of those stages is not cacheable, or once an error
    /// pipeline has taken over the output. Read after `prepare`.
    pub fn key_for_event_pipeline(&self) -> Option<String> {
        if self.error_pipeline.is_some() {
            return None;
        }
        let generator = self.generator.as_ref()?;
        let mut parts = Vec::with_capacity(1 + self.transformers.len());
        parts.push(format!(
            "{}:{}",
            generator.declaration.kind,
            generator.instance.cacheable()?.key()
        ));
        for transformer in &self.transformers {
            parts.push(format!(
                "{}:{}",
                transformer.declaration.kind,
                transformer.instance.cacheable()?.key()
            ));
        }
        Some(parts.join("|"))
    }

    /// Validity of the generator and transformers together; `None` if any is not cacheable
    pub fn validity_for_event_pipeline(&self) -> Option<Validity> {
        if self.error_pipeline.is_some() {
            return None;
        }
        let generator = self.generator.as_ref()?;
        let mut components = Vec::with_capacity(1 + self.transformers.len());
        components.push(generator.instance.cacheable()?.validity());
        for transformer in &self.transformers {
            components.push(transformer.instance.cacheable()?.validity());
        }
        Some(Validity::Aggregate(components))
    }

    /// Prepare if needed, process, then recycle whatever happened
    pub fn execute(&mut self, env: &mut dyn Environment) -> Result<ExecutionStats, ProcessingError> {
        let outcome = self.process(env).map(|_| self.stats.clone());
        self.recycle();
        outcome
    }

    /// Release every stage and reset to the initial state
    pub fn recycle(&mut self) {
        if let Some(stage) = self.generator.take() {
            self.registry.release_generator(&stage.declaration.kind, stage.instance);
        }
        for stage in self.transformers.drain(..) {
            self.registry.release_transformer(&stage.declaration.kind, stage.instance);
        }
        if let Some(stage) = self.serializer.take() {
            self.registry.release_serializer(&stage.declaration.kind, stage.instance);
        }
        if let Some(mut substitute) = self.error_pipeline.take() {
            substitute.recycle();
        }
        if self.state != PipelineState::Unprepared {
            tracing::debug!(state = ?self.state, "recycling pipeline");
        }
        self.error_handler = None;
        self.notification = None;
        self.state = PipelineState::Unprepared;
        self.stats = ExecutionStats::default();
    }
}

impl Drop for ProcessingPipeline {
    fn drop(&mut self) {
        self.recycle();
    }
}

/// Run the generator through the chain into `sink`, returning the number of events the sink saw
fn drive(
    generator: Option<&mut StageInstance<dyn Generator>>,
    transformers: &mut [StageInstance<dyn Transformer>],
    sink: &mut dyn XmlConsumer,
) -> Result<usize, ProcessingError> {
    let generator = generator
        .ok_or_else(|| ProcessingError::IncompletePipeline("no generator set".to_string()))?;
    let mut counted = Counted { inner: sink, events: 0 };
    let mut chain = Chain::new(transformers, &mut counted);
    generator
        .instance
        .generate(&mut chain)
        .map_err(ProcessingError::from_stage)?;
    Ok(counted.events)
}

struct Counted<'a> {
    inner: &'a mut dyn XmlConsumer,
    events: usize,
}

impl XmlConsumer for Counted<'_> {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()> {
        self.events += 1;
        self.inner.event(event)
    }
}

struct SerializerSink<'a> {
    serializer: &'a mut dyn Serializer,
    output: &'a mut dyn Write,
}

impl XmlConsumer for SerializerSink<'_> {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()> {
        self.serializer.serialize(event, &mut *self.output)
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    count: usize,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        CountingWriter { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
