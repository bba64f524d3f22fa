//! Runtime evaluation.

use serde_json::{json, Value};

use crate::cdp::error::CdpError;
use crate::cdp::protocol::RemoteObject;

use super::core::PageSession;
use super::dom::OBJECT_GROUP;

impl PageSession {
    /// Evaluate an expression in the page and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, CdpError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                })),
            )
            .await?;

        check_exception(&result)?;
        Ok(result["result"]["value"].clone())
    }

    /// Call `function` with `this` bound to the remote object; returns its value.
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function: &str,
        args: Option<Vec<Value>>,
    ) -> Result<Value, CdpError> {
        let params = function_params(object_id, function, args, true);
        let result = self.call("Runtime.callFunctionOn", Some(params)).await?;

        check_exception(&result)?;
        Ok(result["result"]["value"].clone())
    }

    /// Like [`call_function_on`](Self::call_function_on), keeping the result remote.
    pub async fn call_function_on_handle(
        &self,
        object_id: &str,
        function: &str,
        args: Option<Vec<Value>>,
    ) -> Result<RemoteObject, CdpError> {
        let params = function_params(object_id, function, args, false);
        let result = self.call("Runtime.callFunctionOn", Some(params)).await?;

        check_exception(&result)?;
        let remote_obj: RemoteObject = serde_json::from_value(result["result"].clone())?;
        Ok(remote_obj)
    }
}

fn function_params(
    object_id: &str,
    function: &str,
    args: Option<Vec<Value>>,
    return_by_value: bool,
) -> Value {
    let mut params = json!({
        "objectId": object_id,
        "functionDeclaration": function,
        "returnByValue": return_by_value,
        "awaitPromise": true,
        "objectGroup": OBJECT_GROUP,
    });

    if let Some(a) = args {
        params["arguments"] = json!(a.into_iter().map(|v| json!({"value": v})).collect::<Vec<_>>());
    }
    params
}

fn check_exception(result: &Value) -> Result<(), CdpError> {
    match result.get("exceptionDetails") {
        Some(exception) => {
            let text = exception["exception"]["description"]
                .as_str()
                .or_else(|| exception["text"].as_str())
                .unwrap_or("Unknown error");
            Err(CdpError::JavaScript(text.to_string()))
        }
        None => Ok(()),
    }
}
