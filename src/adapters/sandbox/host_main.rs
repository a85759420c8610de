//! Entry point of the `task-host` child process.
//!
//! Reads exactly one [`HostRequest`] line from stdin, evaluates it and
//! writes exactly one [`HostResponse`] line to stdout. Anything the host
//! cannot parse is answered with an error response rather than a crash,
//! so the parent only sees an exit without a response when the host
//! really died.

use std::io::{BufRead, Write};

use crate::ports::{HostErrorBody, HostRequest, HostResponse};

use super::script_engine::{build_engine, evaluate, SandboxLimits};

/// Serve one request over the given streams and return the exit code.
pub fn serve_one<R: BufRead, W: Write>(limits: &SandboxLimits, input: R, mut output: W) -> i32 {
    let response = match read_request(input) {
        Ok(request) => {
            let engine = build_engine(limits);
            evaluate(&engine, &request.code, &request.input)
        }
        Err(message) => HostResponse::Error {
            error: HostErrorBody {
                message,
                trace: None,
            },
        },
    };

    let line = match serde_json::to_string(&response) {
        Ok(line) => line,
        Err(_) => return 2,
    };
    if writeln!(output, "{}", line).and_then(|_| output.flush()).is_err() {
        return 3;
    }
    0
}

/// Serve one request over the process's stdin and stdout.
pub fn run_task_host(limits: &SandboxLimits) -> i32 {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_one(limits, stdin.lock(), stdout.lock())
}

fn read_request<R: BufRead>(mut input: R) -> Result<HostRequest, String> {
    let mut line = String::new();
    let read = input
        .read_line(&mut line)
        .map_err(|e| format!("failed to read request: {}", e))?;
    if read == 0 {
        return Err("no request received".to_string());
    }
    serde_json::from_str(line.trim_end()).map_err(|e| format!("malformed request: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn serve(input: &str) -> (i32, HostResponse) {
        let mut output = Vec::new();
        let code = serve_one(&SandboxLimits::default(), input.as_bytes(), &mut output);
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        (code, serde_json::from_str(text.trim_end()).unwrap())
    }

    #[test]
    fn answers_a_request_with_one_line() {
        let (code, response) = serve("{\"code\":\"input.n * 2\",\"input\":{\"n\":5}}\n");
        assert_eq!(code, 0);
        assert_eq!(response, HostResponse::Success { result: json!(10) });
    }

    #[test]
    fn malformed_request_is_reported_not_crashed() {
        let (code, response) = serve("not json\n");
        assert_eq!(code, 0);
        match response {
            HostResponse::Error { error } => assert!(error.message.contains("malformed request")),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn empty_input_is_reported() {
        let (_, response) = serve("");
        match response {
            HostResponse::Error { error } => assert_eq!(error.message, "no request received"),
            other => panic!("expected error, got {:?}", other),
        }
    }
}
