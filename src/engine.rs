use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::builder::JsonBuilder;
use crate::coerce;
use crate::context::{ContextDocument, SlotStep, KEY_COUNTER, KEY_RESPONSES, KEY_TIMES};
use crate::dispatcher::RequestDispatcher;
use crate::errors::Result;
use crate::models::{
    BatchTemplate, DispatchOptions, LoopOptions, LoopTemplate, Request, RequestTemplate, Response,
    ResponseTemplate, VarTemplate,
};

/// Walks the template tree depth-first, sequencing dispatch, transformers,
/// vars blocks, loops and response construction over one shared context
/// document. One `execute` call is one self-contained evaluation.
pub struct BatchEngine<D> {
    builder: JsonBuilder,
    dispatcher: D,
}

impl<D: RequestDispatcher> BatchEngine<D> {
    pub fn new(builder: JsonBuilder, dispatcher: D) -> Self {
        Self {
            builder,
            dispatcher,
        }
    }

    pub fn execute(&self, original: &Request, template: &BatchTemplate) -> Result<Response> {
        debug!(url = %original.url, "start executing batch");
        let mut ctx = ContextDocument::new(original);
        let dispatch_defaults = template.dispatch_options.clone().unwrap_or_default();
        let loop_options = template.loop_options.clone().unwrap_or_default();

        self.run_children(
            &template.requests,
            &mut ctx,
            &[],
            &dispatch_defaults,
            &loop_options,
        )?;

        if let Some(entries) = &template.responses {
            for entry in entries {
                if self.truthy(&entry.predicate, ctx.root())? {
                    debug!("found final response entry");
                    return self.build_response(entry, ctx.root(), 200);
                }
            }
        }
        debug!("no final response entry, returning the whole context");
        Ok(Response {
            status: 200,
            headers: BTreeMap::new(),
            body: ctx.into_value(),
        })
    }

    fn run_children(
        &self,
        templates: &[RequestTemplate],
        ctx: &mut ContextDocument,
        parent: &[SlotStep],
        dispatch_defaults: &DispatchOptions,
        loop_options: &LoopOptions,
    ) -> Result<()> {
        for template in templates {
            let index = ctx.push_child_slot(parent);
            let mut slot = parent.to_vec();
            slot.push(SlotStep::Child(index));
            self.run_node(template, ctx, &slot, dispatch_defaults, loop_options)?;
        }
        Ok(())
    }

    fn run_node(
        &self,
        template: &RequestTemplate,
        ctx: &mut ContextDocument,
        slot: &[SlotStep],
        dispatch_defaults: &DispatchOptions,
        loop_options: &LoopOptions,
    ) -> Result<()> {
        if !self.truthy(&template.predicate, ctx.root())? {
            debug!("node predicate is false, skipping");
            return Ok(());
        }
        if let Some(loop_spec) = &template.loop_spec {
            self.run_loop(loop_spec, ctx, slot, dispatch_defaults, loop_options)?;
        } else if template.url.is_some() {
            self.dispatch_node(template, ctx, slot, dispatch_defaults)?;
        }
        if let Some(children) = &template.requests {
            self.run_children(children, ctx, slot, dispatch_defaults, loop_options)?;
        }
        self.process_vars(template.vars.as_deref(), ctx)?;
        if let Some(entries) = &template.responses {
            let built = self.build_response_entries(entries, ctx)?;
            ctx.set_slot_field(slot, KEY_RESPONSES, Value::Array(built));
        }
        Ok(())
    }

    fn dispatch_node(
        &self,
        template: &RequestTemplate,
        ctx: &mut ContextDocument,
        slot: &[SlotStep],
        dispatch_defaults: &DispatchOptions,
    ) -> Result<()> {
        let Some(url_template) = &template.url else {
            return Ok(());
        };
        let http_method = match &template.http_method {
            Some(m) => coerce::to_text(&self.builder.build_leaf(m, ctx.root())?),
            None => "GET".to_string(),
        };
        let url = coerce::to_text(&self.builder.build_leaf(url_template, ctx.root())?);
        let headers = match &template.headers {
            Some(h) => build_headers(self.builder.build(h, ctx.root())?),
            None => BTreeMap::new(),
        };
        let body = match &template.body {
            Some(b) => self.builder.build(b, ctx.root())?,
            None => Value::Null,
        };
        let request = Request {
            http_method,
            url,
            headers,
            body,
        };

        debug!(index = ctx.chain_len(), method = %request.http_method, url = %request.url, "dispatch request");
        let options = template.dispatch_options.as_ref().unwrap_or(dispatch_defaults);
        let response = self.dispatcher.dispatch(&request, options)?;
        let transformed = self.transform_response(response, template.transformers.as_deref())?;

        ctx.set_slot(slot, request.to_value());
        ctx.push_response(transformed);
        Ok(())
    }

    /// Init once, then Check / Body / Update until the predicate fails or
    /// the configured cap trips.
    fn run_loop(
        &self,
        spec: &LoopTemplate,
        ctx: &mut ContextDocument,
        slot: &[SlotStep],
        dispatch_defaults: &DispatchOptions,
        loop_options: &LoopOptions,
    ) -> Result<()> {
        let counter = self.builder.build(&spec.counter_init, ctx.root())?;
        ctx.set_slot_field(slot, KEY_COUNTER, counter);
        ctx.set_slot_field(slot, KEY_TIMES, Value::Array(Vec::new()));

        let mut iteration = 0u64;
        loop {
            if let Some(max) = loop_options.max_loop_time {
                if iteration >= max {
                    warn!(max, "loop exceeded max loop time");
                    break;
                }
            }
            let predicate = self.builder.build(&spec.counter_predicate, ctx.root())?;
            let proceed = coerce::to_boolean(&predicate)
                .ok_or_else(|| coerce::coercion_error(&predicate, "boolean"))?;
            if !proceed {
                break;
            }

            let time = ctx.push_iteration(slot);
            debug!(iteration = time, "loop iteration");
            for template in &spec.requests {
                let node = ctx.push_iteration_slot(slot, time);
                let mut node_slot = slot.to_vec();
                node_slot.push(SlotStep::Iteration { time, node });
                self.run_node(template, ctx, &node_slot, dispatch_defaults, loop_options)?;
            }
            iteration += 1;

            let next = self.builder.build(&spec.counter_update, ctx.root())?;
            ctx.set_slot_field(slot, KEY_COUNTER, next);
        }
        Ok(())
    }

    /// Fold the raw response through the transformer entries in order; the
    /// current response document is each entry's evaluation context.
    fn transform_response(
        &self,
        response: Response,
        transformers: Option<&[ResponseTemplate]>,
    ) -> Result<Value> {
        let mut current = response.to_value();
        let Some(transformers) = transformers else {
            return Ok(current);
        };
        for entry in transformers {
            if !self.truthy(&entry.predicate, &current)? {
                continue;
            }
            let default_status = current.get("status").and_then(Value::as_i64).unwrap_or(200);
            current = self.build_response(entry, &current, default_status)?.to_value();
        }
        Ok(current)
    }

    fn process_vars(
        &self,
        blocks: Option<&[VarTemplate]>,
        ctx: &mut ContextDocument,
    ) -> Result<()> {
        let Some(blocks) = blocks else {
            return Ok(());
        };
        for block in blocks {
            if !self.truthy(&block.predicate, ctx.root())? {
                continue;
            }
            for (key_template, value_template) in &block.vars {
                // Keys are templates too, enabling data-driven names.
                let key = coerce::to_text(&self.builder.build_leaf(key_template, ctx.root())?);
                let value = self.builder.build(value_template, ctx.root())?;
                debug!(key, "merge var");
                ctx.merge_var(key, value);
            }
        }
        Ok(())
    }

    /// Entries with a false predicate are omitted from the produced
    /// sequence.
    fn build_response_entries(
        &self,
        entries: &[ResponseTemplate],
        ctx: &ContextDocument,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for entry in entries {
            if self.truthy(&entry.predicate, ctx.root())? {
                out.push(self.build_response(entry, ctx.root(), 200)?.to_value());
            }
        }
        Ok(out)
    }

    fn build_response(
        &self,
        template: &ResponseTemplate,
        doc: &Value,
        default_status: i64,
    ) -> Result<Response> {
        let status = match &template.status {
            Some(s) => coerce::to_integer(&self.builder.build(s, doc)?)?,
            None => default_status,
        };
        let headers = match &template.headers {
            Some(h) => build_headers(self.builder.build(h, doc)?),
            None => BTreeMap::new(),
        };
        let body = match &template.body {
            Some(b) => self.builder.build(b, doc)?,
            None => Value::Null,
        };
        Ok(Response {
            status,
            headers,
            body,
        })
    }

    fn truthy(&self, predicate: &Option<String>, doc: &Value) -> Result<bool> {
        match predicate {
            None => Ok(true),
            Some(p) => {
                let value = self.builder.build_leaf(p, doc)?;
                coerce::to_boolean(&value)
                    .ok_or_else(|| coerce::coercion_error(&value, "boolean"))
            }
        }
    }
}

/// Header values: an array becomes one value per element, anything else a
/// single-element list.
fn build_headers(values: Value) -> BTreeMap<String, Vec<String>> {
    let mut headers = BTreeMap::new();
    if let Value::Object(map) = values {
        for (key, value) in map {
            let list = match value {
                Value::Array(items) => items.iter().map(coerce::to_text).collect(),
                other => vec![coerce::to_text(&other)],
            };
            headers.insert(key, list);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::Registry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn engine<D: RequestDispatcher>(dispatcher: D) -> BatchEngine<D> {
        BatchEngine::new(JsonBuilder::new(Registry::with_builtins()), dispatcher)
    }

    #[test]
    fn empty_template_returns_context_document() {
        let eng = engine(|_: &Request, _: &DispatchOptions| Ok(Response::default()));
        let response = eng
            .execute(&Request::default(), &BatchTemplate::default())
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["requests"], json!([]));
        assert_eq!(response.body["responses"], json!([]));
        assert_eq!(response.body["vars"], json!({}));
    }

    #[test]
    fn header_values_normalize_to_lists() {
        let built = build_headers(json!({"a": ["x", 2], "b": "y"}));
        assert_eq!(built["a"], vec!["x".to_string(), "2".to_string()]);
        assert_eq!(built["b"], vec!["y".to_string()]);
    }
}
