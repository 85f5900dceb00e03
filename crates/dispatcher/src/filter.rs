//! Exclude filters
//!
//! Filter expressions are JavaScript, evaluated by an embedded QuickJS
//! context. Each expression is compiled once into a function over the
//! notification bindings and must return a boolean.
//!
//! ```text
//! event.reason === "Pulled"
//! verb == "UPDATE" && event.count == old_event.count
//! obj.kind == "Secret"
//! ```

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use rquickjs::{CatchResultExt, Context, Ctx, Function, Runtime, Value};
use thiserror::Error;

use contracts::{KubeEvent, KubeObject};

/// Filter compile / evaluation errors
#[derive(Debug, Error)]
pub enum FilterError {
    /// The JS runtime could not be created
    #[error("filter engine unavailable: {0}")]
    Engine(String),

    /// Syntax error in the expression
    #[error("could not compile expression `{expression}`: {message}")]
    Compile { expression: String, message: String },

    /// The expression threw while running
    #[error("could not run expression `{expression}`: {message}")]
    Runtime { expression: String, message: String },

    /// The expression returned something other than a boolean
    #[error("expression `{expression}` returned {type_name}, expected a boolean")]
    NotBoolean {
        expression: String,
        type_name: String,
    },

    /// The notification could not be exposed to the engine
    #[error("could not build filter bindings: {0}")]
    Bindings(#[from] serde_json::Error),
}

/// A notification that exclude filters can inspect
pub trait Filterable {
    /// Variable names visible to the expression, in binding order
    const PARAMS: &'static [&'static str];

    /// Values for [`Self::PARAMS`], as a JSON array
    fn bindings(&self) -> Result<serde_json::Value, serde_json::Error>;
}

impl Filterable for KubeEvent {
    const PARAMS: &'static [&'static str] = &["event", "old_event", "verb"];

    fn bindings(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::Value::Array(vec![
            serde_json::to_value(&self.event)?,
            serde_json::to_value(&self.old_event)?,
            self.verb.as_str().into(),
        ]))
    }
}

impl Filterable for KubeObject {
    const PARAMS: &'static [&'static str] = &["object", "obj", "old_obj", "verb"];

    fn bindings(&self) -> Result<serde_json::Value, serde_json::Error> {
        Ok(serde_json::Value::Array(vec![
            serde_json::to_value(self)?,
            self.obj.clone(),
            self.old_obj.clone().unwrap_or_default(),
            self.verb.as_str().into(),
        ]))
    }
}

/// One compiled expression
///
/// The function itself lives in the engine's global object under `slot`.
#[derive(Debug, Clone)]
pub struct FilterProgram {
    expression: String,
    slot: String,
}

impl FilterProgram {
    /// Source expression
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// QuickJS context hosting compiled filter programs
pub struct FilterEngine {
    context: Context,
    _runtime: Runtime,
    next_slot: AtomicUsize,
}

impl FilterEngine {
    /// Create an engine with an empty global scope
    pub fn new() -> Result<Self, FilterError> {
        let runtime = Runtime::new().map_err(|e| FilterError::Engine(e.to_string()))?;
        let context = Context::full(&runtime).map_err(|e| FilterError::Engine(e.to_string()))?;
        Ok(Self {
            context,
            _runtime: runtime,
            next_slot: AtomicUsize::new(0),
        })
    }

    /// Compile `expression` for notifications of type `N`
    ///
    /// # Errors
    /// `FilterError::Compile` on a syntax error.
    pub fn compile<N: Filterable>(&self, expression: &str) -> Result<FilterProgram, FilterError> {
        let slot = format!(
            "__exclude_filter_{}",
            self.next_slot.fetch_add(1, Ordering::Relaxed)
        );
        let source = format!(
            "(function (__bindings) {{\n  const [{}] = __bindings;\n  return (\n{}\n  );\n}})",
            N::PARAMS.join(", "),
            expression
        );

        self.context
            .with(|ctx| -> Result<(), String> {
                let func: Function = ctx.eval(source).catch(&ctx).map_err(|e| e.to_string())?;
                ctx.globals()
                    .set(slot.as_str(), func)
                    .map_err(|e| e.to_string())
            })
            .map_err(|message| FilterError::Compile {
                expression: expression.to_string(),
                message,
            })?;

        Ok(FilterProgram {
            expression: expression.to_string(),
            slot,
        })
    }

    /// Evaluate one program against a notification
    pub fn evaluate<N: Filterable>(
        &self,
        program: &FilterProgram,
        notification: &N,
    ) -> Result<bool, FilterError> {
        self.evaluate_any(std::slice::from_ref(program), notification)
    }

    /// True as soon as one program matches; later programs are not run
    fn evaluate_any<N: Filterable>(
        &self,
        programs: &[FilterProgram],
        notification: &N,
    ) -> Result<bool, FilterError> {
        let bindings = serde_json::to_string(&notification.bindings()?)?;

        self.context.with(|ctx| {
            let args = ctx
                .json_parse(bindings)
                .map_err(|e| FilterError::Engine(e.to_string()))?;
            for program in programs {
                if run_program(&ctx, program, args.clone())? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}

fn run_program<'js>(
    ctx: &Ctx<'js>,
    program: &FilterProgram,
    args: Value<'js>,
) -> Result<bool, FilterError> {
    let runtime_error = |message: String| FilterError::Runtime {
        expression: program.expression.clone(),
        message,
    };

    let func: Function = ctx
        .globals()
        .get(program.slot.as_str())
        .map_err(|e| runtime_error(e.to_string()))?;
    let output: Value = func
        .call((args,))
        .catch(ctx)
        .map_err(|e| runtime_error(e.to_string()))?;

    output.as_bool().ok_or_else(|| FilterError::NotBoolean {
        expression: program.expression.clone(),
        type_name: format!("{:?}", output.type_of()),
    })
}

/// Ordered exclude filters for one router
///
/// A notification is excluded when any expression evaluates to true.
pub struct ExcludeFilters<N> {
    engine: Option<FilterEngine>,
    programs: Vec<FilterProgram>,
    _notification: PhantomData<fn(&N)>,
}

impl<N: Filterable> ExcludeFilters<N> {
    /// Filters that never exclude anything
    pub fn none() -> Self {
        Self {
            engine: None,
            programs: Vec::new(),
            _notification: PhantomData,
        }
    }

    /// Compile every expression, failing on the first invalid one
    pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<Self, FilterError> {
        if expressions.is_empty() {
            return Ok(Self::none());
        }

        let engine = FilterEngine::new()?;
        let programs = expressions
            .iter()
            .map(|expr| engine.compile::<N>(expr.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            engine: Some(engine),
            programs,
            _notification: PhantomData,
        })
    }

    /// Number of compiled programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// True when no filters are configured
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Whether the notification should be dropped
    pub fn excludes(&self, notification: &N) -> Result<bool, FilterError> {
        match &self.engine {
            Some(engine) if !self.programs.is_empty() => {
                engine.evaluate_any(&self.programs, notification)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Event;
    use serde_json::json;

    fn pulled_event() -> KubeEvent {
        KubeEvent::added(Event {
            reason: "Pulled".into(),
            message: "Successfully pulled image".into(),
            count: Some(3),
            ..Default::default()
        })
    }

    #[test]
    fn test_no_filters_never_exclude() {
        let filters = ExcludeFilters::<KubeEvent>::compile::<&str>(&[]).unwrap();
        assert!(filters.is_empty());
        assert!(!filters.excludes(&pulled_event()).unwrap());
    }

    #[test]
    fn test_reason_filter() {
        let filters =
            ExcludeFilters::<KubeEvent>::compile(&[r#"event.reason === "Pulled""#]).unwrap();
        assert!(filters.excludes(&pulled_event()).unwrap());

        let other = KubeEvent::added(Event {
            reason: "Killing".into(),
            ..Default::default()
        });
        assert!(!filters.excludes(&other).unwrap());
    }

    #[test]
    fn test_any_filter_matches() {
        let filters = ExcludeFilters::<KubeEvent>::compile(&[
            r#"verb == "UPDATE""#,
            r#"event.message.startsWith("Successfully")"#,
        ])
        .unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters.excludes(&pulled_event()).unwrap());
    }

    #[test]
    fn test_old_event_binding() {
        let filters = ExcludeFilters::<KubeEvent>::compile(&[
            "old_event !== null && event.count == old_event.count",
        ])
        .unwrap();

        let same = KubeEvent::updated(pulled_event().event, pulled_event().event);
        assert!(filters.excludes(&same).unwrap());
        assert!(!filters.excludes(&pulled_event()).unwrap());
    }

    #[test]
    fn test_missing_property_is_undefined() {
        let filters =
            ExcludeFilters::<KubeEvent>::compile(&["event.action === undefined"]).unwrap();
        assert!(filters.excludes(&pulled_event()).unwrap());
    }

    #[test]
    fn test_object_bindings() {
        let filters = ExcludeFilters::<KubeObject>::compile(&[
            r#"obj.kind == "Secret""#,
            r#"object.verb == "UPDATE" && old_obj.metadata.name == "ignored""#,
        ])
        .unwrap();

        let secret = KubeObject::added(json!({"kind": "Secret", "metadata": {"name": "s"}}));
        let pod = KubeObject::added(json!({"kind": "Pod", "metadata": {"name": "p"}}));
        let renamed = KubeObject::updated(
            json!({"kind": "Pod", "metadata": {"name": "ignored"}}),
            json!({"kind": "Pod", "metadata": {"name": "p"}}),
        );

        assert!(filters.excludes(&secret).unwrap());
        assert!(!filters.excludes(&pod).unwrap());
        assert!(filters.excludes(&renamed).unwrap());
    }

    #[test]
    fn test_syntax_error_fails_compile() {
        let err = ExcludeFilters::<KubeEvent>::compile(&["event.reason ==="]).err().unwrap();
        assert!(matches!(err, FilterError::Compile { .. }), "got: {err}");
    }

    #[test]
    fn test_non_boolean_is_runtime_error() {
        let filters = ExcludeFilters::<KubeEvent>::compile(&["event.count"]).unwrap();
        let err = filters.excludes(&pulled_event()).unwrap_err();
        assert!(matches!(err, FilterError::NotBoolean { .. }), "got: {err}");
    }

    #[test]
    fn test_throwing_expression_is_runtime_error() {
        let filters =
            ExcludeFilters::<KubeEvent>::compile(&["event.source.component == 'kubelet'"])
                .unwrap();
        let err = filters.excludes(&pulled_event()).unwrap_err();
        assert!(matches!(err, FilterError::Runtime { .. }), "got: {err}");
    }

    #[test]
    fn test_unknown_variable_is_runtime_error() {
        let filters = ExcludeFilters::<KubeEvent>::compile(&["undefinedVar == 1"]).unwrap();
        let err = filters.excludes(&pulled_event()).unwrap_err();
        assert!(matches!(err, FilterError::Runtime { .. }), "got: {err}");
    }

    #[test]
    fn test_short_circuit_skips_later_programs() {
        // The second program would throw if it ran.
        let filters =
            ExcludeFilters::<KubeEvent>::compile(&["true", "event.source.component == 'x'"])
                .unwrap();
        assert!(filters.excludes(&pulled_event()).unwrap());
    }

    #[test]
    fn test_single_program_evaluate() {
        let engine = FilterEngine::new().unwrap();
        let program = engine.compile::<KubeEvent>("event.count > 2").unwrap();
        assert_eq!(program.expression(), "event.count > 2");
        assert!(engine.evaluate(&program, &pulled_event()).unwrap());
    }
}
