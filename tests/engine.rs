use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use serde_json::json;

use json_batch::{
    dispatcher, BatchEngine, BatchTemplate, DispatchOptions, Error, JsonBuilder, Registry, Request,
    Response,
};

fn engine_with<D: json_batch::RequestDispatcher>(dispatcher: D) -> BatchEngine<D> {
    BatchEngine::new(JsonBuilder::new(Registry::with_builtins()), dispatcher)
}

fn original_request() -> Request {
    serde_json::from_value(json!({
        "headers": {
            "header_1": ["abc"],
            "header_2": ["qwe", "zxc"]
        },
        "body": {
            "key_1": "abc",
            "key_2": 2
        }
    }))
    .unwrap()
}

#[test]
fn post_node_with_projected_headers_and_sum_response() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "http_method": "POST",
                "url": "https://localhost.com/items",
                "headers": {
                    "header": "str[] $.original.headers.header_2[*]"
                },
                "body": {
                    "key_1": "str $.original.body.key_1",
                    "key_2": "int $.original.body.key_2"
                }
            }
        ],
        "responses": [
            {
                "status": 200,
                "body": {
                    "sum_value": "int __sum(\"$.responses[0].body[*].value\")"
                }
            }
        ]
    }))
    .unwrap();

    let seen = Rc::new(RefCell::new(Vec::<Request>::new()));
    let seen_by_dispatcher = seen.clone();
    let eng = engine_with(move |request: &Request, _: &DispatchOptions| {
        seen_by_dispatcher.borrow_mut().push(request.clone());
        Ok(Response {
            status: 200,
            headers: Default::default(),
            body: json!([{"key": "a", "value": 1}, {"key": "b", "value": 2}]),
        })
    });

    let response = eng.execute(&original_request(), &template).unwrap();

    let dispatched = seen.borrow();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].http_method, "POST");
    assert_eq!(
        dispatched[0].headers["header"],
        vec!["qwe".to_string(), "zxc".to_string()]
    );
    assert_eq!(dispatched[0].body["key_1"], json!("abc"));
    assert_eq!(dispatched[0].body["key_2"], json!(2));

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"sum_value": 3}));
}

#[test]
fn chain_indices_follow_depth_first_dispatch_order() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "url": "https://localhost.com/root",
                "requests": [
                    {
                        "url": "https://localhost.com/child",
                        "requests": [
                            {"url": "https://localhost.com/grandchild"}
                        ]
                    }
                ]
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|request: &Request, _: &DispatchOptions| {
        Ok(Response {
            status: 200,
            headers: Default::default(),
            body: json!({"from": request.url}),
        })
    });

    let response = eng.execute(&original_request(), &template).unwrap();
    let chain = &response.body["responses"];
    assert_eq!(chain[0]["body"]["from"], "https://localhost.com/root");
    assert_eq!(chain[1]["body"]["from"], "https://localhost.com/child");
    assert_eq!(chain[2]["body"]["from"], "https://localhost.com/grandchild");

    // The requests structure mirrors the template tree 1:1.
    let root_slot = &response.body["requests"][0];
    assert_eq!(root_slot["url"], "https://localhost.com/root");
    assert_eq!(
        root_slot["requests"][0]["requests"][0]["url"],
        "https://localhost.com/grandchild"
    );
}

#[test]
fn later_siblings_see_earlier_responses() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {"url": "https://localhost.com/first"},
            {"url": "https://localhost.com/second/@{$.responses[0].body.token}@"}
        ]
    }))
    .unwrap();

    let eng = engine_with(|request: &Request, _: &DispatchOptions| {
        Ok(Response {
            status: 200,
            headers: Default::default(),
            body: json!({"token": "t-1", "echo": request.url}),
        })
    });

    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(
        response.body["requests"][1]["url"],
        "https://localhost.com/second/t-1"
    );
}

#[test]
fn vars_blocks_merge_in_order_with_templated_keys() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "vars": [
                    {"vars": {"var_1": 2}},
                    {"vars": {"var_@{$.vars.var_1}@": "str $.original.body.key_1"}}
                ]
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| Ok(Response::default()));
    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(response.body["vars"]["var_1"], json!(2));
    assert_eq!(response.body["vars"]["var_2"], json!("abc"));
}

#[test]
fn gated_vars_block_is_skipped() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "vars": [
                    {"predicate": "__cmp(\"1 == 2\")", "vars": {"skipped": true}},
                    {"vars": {"kept": true}}
                ]
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| Ok(Response::default()));
    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(response.body["vars"], json!({"kept": true}));
}

#[test]
fn transformers_reshape_the_response_before_it_enters_the_chain() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "url": "https://localhost.com/items",
                "transformers": [
                    {
                        "body": {"first_value": "$.body[0].value"}
                    }
                ]
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| {
        Ok(Response {
            status: 201,
            headers: Default::default(),
            body: json!([{"value": 9}, {"value": 10}]),
        })
    });

    let response = eng.execute(&original_request(), &template).unwrap();
    let entry = &response.body["responses"][0];
    assert_eq!(entry["status"], json!(201));
    assert_eq!(entry["body"], json!({"first_value": 9}));
}

#[test]
fn node_dispatch_options_override_template_scope() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "dispatch_options": {"fail_back_as_string": false},
        "requests": [
            {
                "url": "https://localhost.com/raw",
                "dispatch_options": {"fail_back_as_string": true}
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, options: &DispatchOptions| {
        Ok(Response {
            status: 200,
            headers: Default::default(),
            body: dispatcher::parse_body("plainly not json", options)?,
        })
    });

    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(
        response.body["responses"][0]["body"],
        json!("plainly not json")
    );
}

#[test]
fn false_node_predicate_skips_the_whole_node() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [
            {
                "predicate": "__cmp(\"1 == 2\")",
                "url": "https://localhost.com/never"
            }
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| -> json_batch::Result<Response> {
        panic!("dispatcher must not be called for a skipped node")
    });

    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(response.body["requests"][0], json!(null));
    assert_eq!(response.body["responses"], json!([]));
}

#[test]
fn first_surviving_root_entry_wins() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [],
        "responses": [
            {"predicate": "__cmp(\"1 == 2\")", "status": 500, "body": "Error"},
            {"status": 201, "body": {"ok": "bool true"}},
            {"status": 202, "body": "shadowed"}
        ]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| Ok(Response::default()));
    let response = eng.execute(&original_request(), &template).unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(response.body, json!({"ok": true}));
}

#[test]
fn transport_errors_abort_the_batch() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [{"url": "https://localhost.com/down"}]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| -> json_batch::Result<Response> {
        Err(Error::Transport("connection refused".into()))
    });

    assert!(matches!(
        eng.execute(&original_request(), &template),
        Err(Error::Transport(_))
    ));
}

#[test]
fn unresolved_reference_aborts_the_batch() {
    let template: BatchTemplate = serde_json::from_value(json!({
        "requests": [{"url": "https://localhost.com/@{$.vars.missing}@"}]
    }))
    .unwrap();

    let eng = engine_with(|_: &Request, _: &DispatchOptions| Ok(Response::default()));
    assert!(matches!(
        eng.execute(&original_request(), &template),
        Err(Error::UnresolvedReference(_))
    ));
}
