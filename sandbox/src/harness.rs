//! Isolate harness script
//!
//! The submitted program never runs at module scope. It is embedded as a
//! JSON string literal into this harness, which evaluates it inside a vm
//! context created from a null prototype. The context carries only a
//! `console` shim — no `require`, no `process`, no filesystem, network,
//! timers or environment — and code generation from strings is disabled in
//! the context, so `eval` and `new Function` are dead ends even if they get
//! past the guard rails.

/// Node script template; placeholders are substituted, not format!-ed, so
/// the JS braces stay readable.
const HARNESS_TEMPLATE: &str = r#""use strict";
const vm = require("vm");
const util = require("util");

const source = __SOURCE__;

const emit = (stream) => (...args) => {
  stream.write(util.format(...args) + "\n");
};

const context = Object.create(null);
context.console = {
  log: emit(process.stdout),
  info: emit(process.stdout),
  warn: emit(process.stderr),
  error: emit(process.stderr),
};

vm.createContext(context, {
  codeGeneration: { strings: false, wasm: false },
});

try {
  vm.runInContext(source, context, {
    filename: "program.js",
    timeout: __TIMEOUT_MS__,
  });
} catch (err) {
  const message = err instanceof Error && err.stack ? err.stack : String(err);
  process.stderr.write(message + "\n");
  process.exit(1);
}
"#;

/// Render the harness with the user program embedded.
pub fn build_harness(code: &str, vm_timeout_ms: u64) -> String {
    // A JSON string literal is also a valid JS string literal, so this is
    // the whole escaping story.
    let source = serde_json::to_string(code).expect("strings always serialize");
    HARNESS_TEMPLATE
        .replace("__SOURCE__", &source)
        .replace("__TIMEOUT_MS__", &vm_timeout_ms.to_string())
}
