// tests/error_recovery_tests.rs
mod common;

use common::{journal, registry, Journal};
use std::sync::Arc;
use xmlpipe::{
    EventBuffer, PipelineConfig, ProcessingError, ProcessingPipeline, Request, StageDeclaration, StageRegistry,
    XmlEvent,
};

const ERROR_DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?><error/>"#;

fn error_doc_handler(
    registry: Arc<StageRegistry>,
) -> impl FnMut(&ProcessingError) -> Result<Option<ProcessingPipeline>, ProcessingError> + Send {
    move |_error: &ProcessingError| -> Result<Option<ProcessingPipeline>, ProcessingError> {
        let mut pipeline = ProcessingPipeline::new(Arc::clone(&registry), PipelineConfig::default());
        pipeline.set_generator(StageDeclaration::new("error-doc").parameter("label", "error-doc"))?;
        pipeline.set_serializer(StageDeclaration::new("xml"))?;
        Ok(Some(pipeline))
    }
}

fn failing_pipeline(journal: &Journal, generator: StageDeclaration) -> (ProcessingPipeline, Arc<StageRegistry>) {
    let registry = registry(journal);
    let mut pipeline = ProcessingPipeline::new(Arc::clone(&registry), PipelineConfig::default());
    pipeline.set_generator(generator).unwrap();
    pipeline.add_transformer(StageDeclaration::new("identity")).unwrap();
    pipeline.set_serializer(StageDeclaration::new("xml")).unwrap();
    (pipeline, registry)
}

#[test]
fn test_error_pipeline_replaces_output() {
    println!("=== Testing Recovery: substitute output ===");

    let journal = journal();
    let (mut pipeline, registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-after", "2"));
    pipeline.set_error_handler(Box::new(error_doc_handler(Arc::clone(&registry))));

    let mut request = Request::new(Vec::new());
    assert!(pipeline.process(&mut request).unwrap());
    assert!(pipeline.stats().substituted);
    assert!(pipeline.error_pipeline().is_some());

    // Nothing of the failed <a> reaches the destination
    assert_eq!(String::from_utf8(request.into_output()).unwrap(), ERROR_DOC);

    pipeline.recycle();
    assert_eq!(registry.outstanding(), 0);
    println!("✓ Only the error pipeline's output delivered");
}

#[test]
fn test_setup_failure_substituted() {
    println!("=== Testing Recovery: setup failure ===");

    let journal = journal();
    let (mut pipeline, registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-setup", "true"));
    pipeline.set_error_handler(Box::new(error_doc_handler(registry)));

    let mut request = Request::new(Vec::new());
    pipeline.prepare(&request).unwrap();
    assert!(pipeline.error_pipeline().is_some());
    assert_eq!(pipeline.mime_type(), Some("text/xml"));

    assert!(pipeline.process(&mut request).unwrap());
    assert!(pipeline.stats().substituted);
    assert!(pipeline.stats().events > 0);
    assert_eq!(pipeline.stats().bytes_written, ERROR_DOC.len());
    assert_eq!(String::from_utf8(request.into_output()).unwrap(), ERROR_DOC);
    println!("✓ Setup failure rendered by the error pipeline");
}

#[test]
fn test_declined_handler_returns_original_error() {
    println!("=== Testing Recovery: handler declines ===");

    let journal = journal();
    let (mut pipeline, _registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-after", "2"));
    pipeline.set_error_handler(Box::new(
        |_error: &ProcessingError| -> Result<Option<ProcessingPipeline>, ProcessingError> { Ok(None) },
    ));

    let mut request = Request::new(Vec::new());
    let err = pipeline.process(&mut request).unwrap_err();
    assert!(matches!(err, ProcessingError::Execution { .. }));
    assert!(!pipeline.stats().substituted);
    assert!(request.into_output().is_empty());
    println!("✓ Original failure propagated");
}

#[test]
fn test_failing_handler_returns_original_error() {
    println!("=== Testing Recovery: handler fails ===");

    let journal = journal();
    let (mut pipeline, _registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-setup", "yes"));
    pipeline.set_error_handler(Box::new(
        |_error: &ProcessingError| -> Result<Option<ProcessingPipeline>, ProcessingError> {
            Err(ProcessingError::InvalidState("no error page today".to_string()))
        },
    ));

    let err = pipeline.prepare(&Request::new(Vec::new())).unwrap_err();
    assert!(err.is_setup(), "{:?}", err);
    println!("✓ First failure wins over the handler's: {}", err);
}

#[test]
fn test_failing_substitute_returns_original_error() {
    println!("=== Testing Recovery: substitute fails too ===");

    let journal = journal();
    let (mut pipeline, registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-after", "2"));
    pipeline.set_error_handler(Box::new(
        move |_error: &ProcessingError| -> Result<Option<ProcessingPipeline>, ProcessingError> {
            let mut substitute = ProcessingPipeline::new(Arc::clone(&registry), PipelineConfig::default());
            substitute.set_generator(StageDeclaration::new("scripted").parameter("fail-after", "1"))?;
            substitute.set_serializer(StageDeclaration::new("xml"))?;
            Ok(Some(substitute))
        },
    ));

    let mut request = Request::new(Vec::new());
    let err = pipeline.process(&mut request).unwrap_err();
    match &err {
        ProcessingError::Execution { source } => {
            assert!(source.to_string().contains("after 2 events"), "{}", source)
        }
        other => panic!("expected the original execution error, got {:?}", other),
    }
    assert!(request.into_output().is_empty());
    println!("✓ Original error returned, secondary logged");
}

#[test]
fn test_notification_reaches_error_pipeline() {
    println!("=== Testing Recovery: notification ===");

    let journal = journal();
    let (mut pipeline, registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-after", "2"));
    pipeline.set_error_handler(Box::new(
        move |_error: &ProcessingError| -> Result<Option<ProcessingPipeline>, ProcessingError> {
            let mut substitute = ProcessingPipeline::new(Arc::clone(&registry), PipelineConfig::default());
            substitute.set_generator(StageDeclaration::new("notifying"))?;
            substitute.set_serializer(StageDeclaration::new("xml").parameter("omit-xml-declaration", "true"))?;
            Ok(Some(substitute))
        },
    ));

    let mut request = Request::new(Vec::new());
    pipeline.process(&mut request).unwrap();
    let output = String::from_utf8(request.into_output()).unwrap();
    println!("Error page: {}", output);

    assert!(output.starts_with(r#"<notify type="error"><title>Pipeline execution failed</title>"#));
    assert!(output.contains("<message>Failed to execute pipeline.</message>"));
    assert!(output.contains(r#"<extra description="cause">scripted failure after 2 events</extra>"#));
    assert!(output.ends_with("</notify>"));
    println!("✓ Failure rendered as a notification");
}

#[test]
fn test_process_to_substitutes_events() {
    println!("=== Testing Recovery: external consumer ===");

    let journal = journal();
    let (mut pipeline, registry) =
        failing_pipeline(&journal, StageDeclaration::new("scripted").parameter("fail-after", "3"));
    pipeline.set_error_handler(Box::new(error_doc_handler(registry)));

    let mut consumer = EventBuffer::new();
    assert!(pipeline.process_to(&mut Request::new(Vec::new()), &mut consumer).unwrap());
    assert_eq!(
        consumer.events(),
        &[
            XmlEvent::StartDocument,
            XmlEvent::start("error"),
            XmlEvent::end("error"),
            XmlEvent::EndDocument,
        ]
    );
    println!("✓ Consumer saw only the error pipeline's events");
}

#[test]
fn test_handler_forces_complete_buffering() {
    println!("=== Testing Recovery: streaming configuration ===");

    let journal = journal();
    let registry = registry(&journal);
    let mut pipeline = ProcessingPipeline::new(Arc::clone(&registry), PipelineConfig::streaming(1));
    pipeline
        .set_generator(StageDeclaration::new("scripted").parameter("fail-after", "4"))
        .unwrap();
    pipeline.set_serializer(StageDeclaration::new("xml")).unwrap();
    pipeline.set_error_handler(Box::new(error_doc_handler(Arc::clone(&registry))));

    let mut request = Request::new(Vec::new());
    let stats = pipeline.execute(&mut request).unwrap();
    assert!(stats.substituted);
    assert_eq!(String::from_utf8(request.into_output()).unwrap(), ERROR_DOC);
    assert_eq!(registry.outstanding(), 0);
    println!("✓ No bytes of the failed attempt leaked");
}
