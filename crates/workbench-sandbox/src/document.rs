//! The HTML document loaded into a sandbox realm.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::errors::SandboxError;
use crate::message::Generation;
use crate::transform::TransformedSource;

/// Template renderer abstraction, so hosts can swap the engine.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, SandboxError>;
}

/// Default renderer backed by `handlebars`.
pub struct HandlebarsTemplateRenderer;

impl TemplateRenderer for HandlebarsTemplateRenderer {
    fn render(&self, template: &str, data: &serde_json::Value) -> Result<String, SandboxError> {
        let mut registry = handlebars::Handlebars::new();
        registry.set_strict_mode(true);
        registry
            .render_template(template, data)
            .map_err(|e| SandboxError::Template(e.to_string()))
    }
}

/// A pinned third-party script the document may load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrustedInclude {
    pub name: &'static str,
    pub url: &'static str,
}

/// The only external scripts a sandbox document references.
pub const TRUSTED_INCLUDES: &[TrustedInclude] = &[
    TrustedInclude {
        name: "react",
        url: "https://unpkg.com/react@18.3.1/umd/react.production.min.js",
    },
    TrustedInclude {
        name: "react-dom",
        url: "https://unpkg.com/react-dom@18.3.1/umd/react-dom.production.min.js",
    },
    TrustedInclude {
        name: "babel-standalone",
        url: "https://unpkg.com/@babel/standalone@7.26.4/babel.min.js",
    },
    TrustedInclude {
        name: "tailwindcss",
        url: "https://cdn.tailwindcss.com/3.4.16",
    },
];

/// Components the generated code may use without importing them.
pub const STUB_PRIMITIVES: &[&str] = &[
    "Button",
    "Card",
    "CardHeader",
    "CardTitle",
    "CardDescription",
    "CardContent",
    "CardFooter",
    "Input",
    "Textarea",
    "Label",
    "Badge",
    "Separator",
];

const STUB_SOURCE: &str = r#"const Button = ({ className = '', variant = 'default', size = 'default', ...props }) => {
  const variants = {
    default: 'bg-slate-900 text-white hover:bg-slate-800',
    outline: 'border border-slate-300 bg-white hover:bg-slate-50',
    secondary: 'bg-slate-100 text-slate-900 hover:bg-slate-200',
    ghost: 'hover:bg-slate-100',
    destructive: 'bg-red-600 text-white hover:bg-red-700',
  };
  const sizes = { default: 'h-10 px-4 py-2', sm: 'h-9 px-3', lg: 'h-11 px-8', icon: 'h-10 w-10' };
  return <button className={cx('inline-flex items-center justify-center rounded-md text-sm font-medium transition-colors disabled:opacity-50', variants[variant] || variants.default, sizes[size] || sizes.default, className)} {...props} />;
};
const Card = ({ className = '', ...props }) => <div className={cx('rounded-lg border border-slate-200 bg-white shadow-sm', className)} {...props} />;
const CardHeader = ({ className = '', ...props }) => <div className={cx('flex flex-col space-y-1.5 p-6', className)} {...props} />;
const CardTitle = ({ className = '', ...props }) => <h3 className={cx('text-2xl font-semibold leading-none tracking-tight', className)} {...props} />;
const CardDescription = ({ className = '', ...props }) => <p className={cx('text-sm text-slate-500', className)} {...props} />;
const CardContent = ({ className = '', ...props }) => <div className={cx('p-6 pt-0', className)} {...props} />;
const CardFooter = ({ className = '', ...props }) => <div className={cx('flex items-center p-6 pt-0', className)} {...props} />;
const Input = ({ className = '', ...props }) => <input className={cx('flex h-10 w-full rounded-md border border-slate-300 bg-white px-3 py-2 text-sm', className)} {...props} />;
const Textarea = ({ className = '', ...props }) => <textarea className={cx('flex min-h-[80px] w-full rounded-md border border-slate-300 bg-white px-3 py-2 text-sm', className)} {...props} />;
const Label = ({ className = '', ...props }) => <label className={cx('text-sm font-medium leading-none', className)} {...props} />;
const Badge = ({ className = '', variant = 'default', ...props }) => {
  const variants = {
    default: 'bg-slate-900 text-white',
    secondary: 'bg-slate-100 text-slate-900',
    outline: 'border border-slate-300 text-slate-900',
    destructive: 'bg-red-600 text-white',
  };
  return <span className={cx('inline-flex items-center rounded-full px-2.5 py-0.5 text-xs font-semibold', variants[variant] || variants.default, className)} {...props} />;
};
const Separator = ({ className = '', orientation = 'horizontal', ...props }) => <div role="separator" className={cx('shrink-0 bg-slate-200', orientation === 'vertical' ? 'h-full w-px' : 'h-px w-full', className)} {...props} />;
"#;

const DOCUMENT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8" />
<meta name="viewport" content="width=device-width, initial-scale=1" />
{{#each includes}}
<script src="{{this.url}}" data-include="{{this.name}}" crossorigin="anonymous"></script>
{{/each}}
<style>
  body { margin: 0; font-family: ui-sans-serif, system-ui, sans-serif; }
  #sandbox-error { display: none; margin: 16px; padding: 12px 16px; border: 1px solid #fca5a5; border-radius: 8px; background: #fef2f2; color: #991b1b; white-space: pre-wrap; font-family: ui-monospace, monospace; font-size: 13px; }
</style>
</head>
<body>
<div id="root"></div>
<pre id="sandbox-error"></pre>
<script>
(function () {
  var GENERATION = {{generation}};
  function post(message) {
    message.generation = GENERATION;
    try { window.parent.postMessage(message, '*'); } catch (_) {}
  }
  function describe(value) {
    if (value instanceof Error) { return value.stack || value.message; }
    if (typeof value === 'string') { return value; }
    try { return JSON.stringify(value); } catch (_) { return String(value); }
  }
  function showError(text) {
    var surface = document.getElementById('sandbox-error');
    surface.textContent = text;
    surface.style.display = 'block';
  }
  ['log', 'warn', 'error', 'info'].forEach(function (method) {
    var original = console[method];
    console[method] = function () {
      var args = Array.prototype.slice.call(arguments);
      original.apply(console, args);
      post({ type: 'console', method: method, message: args.map(describe).join(' ') });
    };
  });
  window.addEventListener('error', function (event) {
    var text = event.error ? describe(event.error) : String(event.message);
    showError(text);
    post({ type: 'sandbox-error', error: text });
  });
  window.addEventListener('unhandledrejection', function (event) {
    var text = describe(event.reason);
    showError(text);
    post({ type: 'sandbox-error', error: text });
  });
  window.__sandbox = { post: post, describe: describe, showError: showError };
})();
</script>
<script type="text/babel" data-presets="react">
const { useState, useEffect, useMemo, useCallback, useRef, useReducer, useContext, createContext, Fragment } = React;
function cx() { return Array.prototype.filter.call(arguments, Boolean).join(' '); }
{{{stubs}}}
{{{code}}}
function reportMountError(error) {
  const text = window.__sandbox.describe(error);
  window.__sandbox.showError(text);
  window.__sandbox.post({ type: 'sandbox-error', error: text });
}
class SandboxBoundary extends React.Component {
  constructor(props) { super(props); this.state = { failed: false }; }
  static getDerivedStateFromError() { return { failed: true }; }
  componentDidCatch(error) { reportMountError(error); }
  componentDidMount() { if (!this.state.failed) { window.__sandbox.post({ type: 'sandbox-ready' }); } }
  render() { return this.state.failed ? null : this.props.children; }
}
try {
  const root = ReactDOM.createRoot(document.getElementById('root'));
  ReactDOM.flushSync(() => root.render(React.createElement(SandboxBoundary, null, React.createElement({{entryPoint}}))));
} catch (error) {
  reportMountError(error);
}
</script>
</body>
</html>
"#;

static SCRIPT_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(script)").expect("static pattern is valid"));

/// Keeps user code from terminating the surrounding `<script>` element.
pub fn escape_script_close(code: &str) -> String {
    SCRIPT_CLOSE.replace_all(code, r"<\/$1").into_owned()
}

/// One renderable document for one load generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxDocument {
    pub generation: Generation,
    pub source: TransformedSource,
}

impl SandboxDocument {
    pub fn new(generation: Generation, source: TransformedSource) -> Self {
        Self { generation, source }
    }

    pub fn render(&self, renderer: &dyn TemplateRenderer) -> Result<String, SandboxError> {
        let data = serde_json::json!({
            "generation": self.generation.0,
            "includes": TRUSTED_INCLUDES,
            "stubs": escape_script_close(STUB_SOURCE),
            "code": escape_script_close(&self.source.code),
            "entryPoint": self.source.entry_point,
        });
        renderer.render(DOCUMENT_TEMPLATE, &data)
    }
}
