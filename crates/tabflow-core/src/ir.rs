//! Op registry descriptor shapes and the validated IR plan.
//!
//! The registry *table* (the concrete list of entries, since their
//! constructors reference codec/ops types) lives in `tabflow-plan`,
//! which depends on this crate plus `tabflow-codec`/`tabflow-ops`. This
//! module only defines the shapes: [`OpEntry`], [`Node`], [`Plan`], and
//! the validation/schema-inference algorithms that walk a registry
//! slice generically.

use crate::batch::Schema;
use crate::capabilities::Capabilities;
use crate::{ArgTree, Decoder, Encoder, Transform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Decoder,
    Encoder,
    Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Has a native constructor in this implementation.
    Core,
    /// Named in the vocabulary (so it validates and schema-infers) but
    /// has no native target; compiling one fails with "no native target".
    Ecosystem,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgDescriptor {
    pub name: &'static str,
    pub required: bool,
}

/// What a constructor hands back to the compiler: exactly one of a
/// decoder, an encoder, or a transform step.
pub enum CompiledOp {
    Decoder(Box<dyn Decoder>),
    Encoder(Box<dyn Encoder>),
    Transform(Box<dyn Transform>),
}

pub type SchemaFn = fn(&ArgTree, &Schema) -> Schema;
pub type ConstructorFn = fn(&ArgTree) -> anyhow::Result<CompiledOp>;

/// A single registry entry: a pure description. Nothing is instantiated
/// until the compiler calls `constructor`.
pub struct OpEntry {
    pub name: &'static str,
    pub kind: OpKind,
    pub tier: Tier,
    pub capabilities: Capabilities,
    pub args: &'static [ArgDescriptor],
    pub schema_fn: SchemaFn,
    /// `None` for ops whose effect is a compile-time no-op (e.g.
    /// `flatten` when there's nothing to do natively).
    pub constructor: Option<ConstructorFn>,
}

impl OpEntry {
    pub fn find<'a>(registry: &'a [OpEntry], name: &str) -> Option<&'a OpEntry> {
        registry.iter().find(|e| e.name == name)
    }

    pub fn get(registry: &[OpEntry], index: usize) -> Option<&OpEntry> {
        registry.get(index)
    }

    fn has_arg(&self, args: &ArgTree, name: &str) -> bool {
        args.get(name).is_some()
    }
}

/// One stage of the plan: an op name plus its argument tree, annotated
/// with inferred schemas and capability bits once the plan validates.
#[derive(Debug, Clone)]
pub struct Node {
    pub op: String,
    pub args: ArgTree,
    pub input_schema: Schema,
    pub output_schema: Schema,
    pub capabilities: Capabilities,
    pub position: usize,
}

impl Node {
    fn new(op: String, args: ArgTree, position: usize) -> Self {
        Node {
            op,
            args,
            input_schema: Schema::empty(),
            output_schema: Schema::empty(),
            capabilities: Capabilities::empty(),
            position,
        }
    }
}

/// The validated, schema-annotated sequence of op nodes a concrete
/// operator chain is compiled from.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub nodes: Vec<Node>,
    pub schema: Schema,
    pub capabilities: Capabilities,
    pub valid: bool,
    pub error: Option<String>,
}

impl Plan {
    pub fn new() -> Self {
        Plan {
            nodes: Vec::new(),
            schema: Schema::empty(),
            capabilities: Capabilities::empty(),
            valid: false,
            error: None,
        }
    }

    pub fn add_node(&mut self, op_name: impl Into<String>, args: ArgTree) {
        let position = self.nodes.len();
        self.nodes.push(Node::new(op_name.into(), args, position));
    }

    /// Validation rules in spec order; first failure aborts and records
    /// a human-readable error on the plan. On success, runs schema
    /// inference and ANDs capability bits across every node.
    pub fn validate(&mut self, registry: &[OpEntry]) -> bool {
        self.valid = false;
        self.error = None;

        if self.nodes.is_empty() {
            return self.fail("plan has no nodes");
        }

        let n = self.nodes.len();
        let decoder_positions: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                OpEntry::find(registry, &node.op).map(|e| e.kind) == Some(OpKind::Decoder)
            })
            .map(|(i, _)| i)
            .collect();
        let encoder_positions: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                OpEntry::find(registry, &node.op).map(|e| e.kind) == Some(OpKind::Encoder)
            })
            .map(|(i, _)| i)
            .collect();

        if decoder_positions != vec![0] {
            return self.fail("plan must have exactly one decoder, at index 0");
        }
        if encoder_positions != vec![n - 1] {
            return self.fail("plan must have exactly one encoder, at the last index");
        }

        for node in &self.nodes {
            let Some(entry) = OpEntry::find(registry, &node.op) else {
                return self.fail(&format!("unknown op `{}`", node.op));
            };
            for arg in entry.args {
                if arg.required && !entry.has_arg(&node.args, arg.name) {
                    return self.fail(&format!(
                        "`{}` is missing required argument `{}`",
                        node.op, arg.name
                    ));
                }
            }
        }

        self.valid = true;
        self.infer_schema(registry);
        self.capabilities = self
            .nodes
            .iter()
            .fold(Capabilities::all(), |acc, n| acc & n.capabilities);
        true
    }

    fn fail(&mut self, message: &str) -> bool {
        self.valid = false;
        self.error = Some(message.to_string());
        false
    }

    /// Thread each node's inferred output schema to the next node's
    /// input, copying capability bits from the registry. A schema-fn
    /// failure is non-fatal: later nodes simply see `known = false`.
    fn infer_schema(&mut self, registry: &[OpEntry]) {
        let mut current = Schema::empty();
        for node in &mut self.nodes {
            let Some(entry) = OpEntry::find(registry, &node.op) else {
                continue;
            };
            node.capabilities = entry.capabilities;
            node.input_schema = current.clone();
            let out = (entry.schema_fn)(&node.args, &current);
            node.output_schema = out.clone();
            current = out;
        }
        self.schema = current;
    }
}

/// What the compiler places into the three operator slots.
pub struct CompiledPipeline {
    pub decoder: Box<dyn Decoder>,
    pub steps: Vec<Box<dyn Transform>>,
    pub encoder: Box<dyn Encoder>,
}

/// Walk IR nodes, look each up in the registry, and call its
/// constructor with the node's argument tree. Aborts on the first
/// missing native target or constructor error, dropping whatever was
/// already constructed (their `Drop` impls discharge the teacher's
/// `destroy` step).
pub fn compile(plan: &Plan, registry: &[OpEntry]) -> anyhow::Result<CompiledPipeline> {
    if !plan.valid {
        anyhow::bail!(plan.error.clone().unwrap_or_else(|| "plan is not valid".to_string()));
    }

    let mut decoder: Option<Box<dyn Decoder>> = None;
    let mut encoder: Option<Box<dyn Encoder>> = None;
    let mut steps: Vec<Box<dyn Transform>> = Vec::new();

    for node in &plan.nodes {
        let entry = OpEntry::find(registry, &node.op)
            .ok_or_else(|| anyhow::anyhow!("unknown op `{}`", node.op))?;
        let Some(ctor) = entry.constructor else {
            if entry.tier == Tier::Ecosystem {
                anyhow::bail!("`{}` has no native target", node.op);
            }
            continue;
        };
        match ctor(&node.args)? {
            CompiledOp::Decoder(d) => decoder = Some(d),
            CompiledOp::Encoder(e) => encoder = Some(e),
            CompiledOp::Transform(t) => steps.push(t),
        }
    }

    Ok(CompiledPipeline {
        decoder: decoder.ok_or_else(|| anyhow::anyhow!("plan compiled with no decoder"))?,
        steps,
        encoder: encoder.ok_or_else(|| anyhow::anyhow!("plan compiled with no encoder"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_schema_fn(_args: &ArgTree, input: &Schema) -> Schema {
        input.clone()
    }

    fn decoder_entry() -> OpEntry {
        OpEntry {
            name: "codec.csv.decode",
            kind: OpKind::Decoder,
            tier: Tier::Core,
            capabilities: Capabilities::STREAMING | Capabilities::DETERMINISTIC,
            args: &[],
            schema_fn: |_args, _input| Schema::empty(),
            constructor: None,
        }
    }

    fn encoder_entry() -> OpEntry {
        OpEntry {
            name: "codec.csv.encode",
            kind: OpKind::Encoder,
            tier: Tier::Core,
            capabilities: Capabilities::STREAMING | Capabilities::DETERMINISTIC,
            args: &[],
            schema_fn: noop_schema_fn,
            constructor: None,
        }
    }

    fn filter_entry() -> OpEntry {
        OpEntry {
            name: "filter",
            kind: OpKind::Transform,
            tier: Tier::Core,
            capabilities: Capabilities::STREAMING
                | Capabilities::BOUNDED_MEMORY
                | Capabilities::DETERMINISTIC,
            args: &[ArgDescriptor {
                name: "expr",
                required: true,
            }],
            schema_fn: noop_schema_fn,
            constructor: None,
        }
    }

    #[test]
    fn empty_plan_is_invalid() {
        let mut plan = Plan::new();
        let registry = vec![decoder_entry(), encoder_entry()];
        assert!(!plan.validate(&registry));
        assert_eq!(plan.error.as_deref(), Some("plan has no nodes"));
    }

    #[test]
    fn missing_required_argument_fails() {
        let mut plan = Plan::new();
        plan.add_node("codec.csv.decode", serde_json::json!({}));
        plan.add_node("filter", serde_json::json!({}));
        plan.add_node("codec.csv.encode", serde_json::json!({}));
        let registry = vec![decoder_entry(), filter_entry(), encoder_entry()];
        assert!(!plan.validate(&registry));
        assert!(plan.error.unwrap().contains("expr"));
    }

    #[test]
    fn valid_plan_ands_capabilities() {
        let mut plan = Plan::new();
        plan.add_node("codec.csv.decode", serde_json::json!({}));
        plan.add_node("filter", serde_json::json!({"expr": "col(a) > 1"}));
        plan.add_node("codec.csv.encode", serde_json::json!({}));
        let registry = vec![decoder_entry(), filter_entry(), encoder_entry()];
        assert!(plan.validate(&registry));
        assert!(plan.capabilities.contains(Capabilities::STREAMING));
    }

    #[test]
    fn decoder_not_at_head_fails() {
        let mut plan = Plan::new();
        plan.add_node("filter", serde_json::json!({"expr": "col(a) > 1"}));
        plan.add_node("codec.csv.decode", serde_json::json!({}));
        plan.add_node("codec.csv.encode", serde_json::json!({}));
        let registry = vec![decoder_entry(), filter_entry(), encoder_entry()];
        assert!(!plan.validate(&registry));
    }
}
