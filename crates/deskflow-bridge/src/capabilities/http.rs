use std::fs::File;
use std::io;
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::error::{BridgeError, Result};
use crate::registry::{MethodRegistry, Params};

const DEFAULT_TIMEOUT_SECS: i64 = 10;
const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

fn timeout(params: &Params) -> Result<Duration> {
    let secs = params.i64_or("timeout", DEFAULT_TIMEOUT_SECS)?;
    Ok(Duration::from_secs(secs.clamp(1, 600).unsigned_abs()))
}

fn with_headers(mut request: ureq::Request, params: &Params) -> ureq::Request {
    if let Some(Value::Object(headers)) = params.get("headers") {
        for (name, value) in headers {
            let value = value
                .as_str()
                .map_or_else(|| value.to_string(), str::to_string);
            request = request.set(name, &value);
        }
    }
    request
}

/// Non-2xx answers are still answers; only transport failures are errors.
fn settle(outcome: std::result::Result<ureq::Response, ureq::Error>) -> Result<ureq::Response> {
    match outcome {
        Ok(response) | Err(ureq::Error::Status(_, response)) => Ok(response),
        Err(e) => Err(BridgeError::Http(e.to_string())),
    }
}

fn into_json(response: ureq::Response) -> Result<Value> {
    let status = response.status();
    let headers: Map<String, Value> = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_string();
            Some((name, Value::String(value)))
        })
        .collect();
    let text = response
        .into_string()
        .map_err(|e| BridgeError::Http(e.to_string()))?;
    Ok(json!({"status": status, "text": text, "headers": headers}))
}

fn get(params: &Params) -> Result<Value> {
    let request = ureq::get(params.str("url")?).timeout(timeout(params)?);
    into_json(settle(with_headers(request, params).call())?)
}

fn post(params: &Params) -> Result<Value> {
    let request = with_headers(
        ureq::post(params.str("url")?).timeout(timeout(params)?),
        params,
    );
    let outcome = if let Some(body) = params.get("json_body") {
        request
            .set("Content-Type", "application/json")
            .send_string(&body.to_string())
    } else {
        match params.get("data") {
            Some(Value::String(text)) => request.send_string(text),
            Some(Value::Object(fields)) => {
                let pairs: Vec<(String, String)> = fields
                    .iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                        (k.clone(), v)
                    })
                    .collect();
                let borrowed: Vec<(&str, &str)> =
                    pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                request.send_form(&borrowed)
            }
            Some(other) => request.send_string(&other.to_string()),
            None => request.call(),
        }
    };
    into_json(settle(outcome)?)
}

fn download(params: &Params) -> Result<Value> {
    let save_path = params.str("save_path")?;
    let response = ureq::get(params.str("url")?)
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .call()
        .map_err(|e| BridgeError::Http(e.to_string()))?;

    let mut file = File::create(save_path)?;
    io::copy(&mut response.into_reader(), &mut file)?;
    Ok(Value::String(save_path.to_string()))
}

pub fn register(registry: &mut MethodRegistry) {
    registry.register("http.get", get);
    registry.register("http.post", post);
    registry.register("http.download", download);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_defaults_and_bounds() {
        let params = Params::from_value(json!({})).unwrap();
        assert_eq!(timeout(&params).unwrap(), Duration::from_secs(10));

        let params = Params::from_value(json!({"timeout": 0})).unwrap();
        assert_eq!(timeout(&params).unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_url_is_required() {
        let params = Params::from_value(json!({})).unwrap();
        assert!(matches!(get(&params), Err(BridgeError::MissingParam("url"))));
        assert!(matches!(
            download(&params),
            Err(BridgeError::MissingParam("save_path"))
        ));
    }
}
