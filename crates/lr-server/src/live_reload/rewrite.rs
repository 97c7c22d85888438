//! Reload script injection.

use super::sniff::sniff;

/// Client script source with a URL placeholder.
const CLIENT_SCRIPT: &str = include_str!("client.js");

/// Replaced with a JavaScript string literal of the subscribe URL.
const URL_PLACEHOLDER: &str = "__LIVERELOAD_URL__";

const SCRIPT_OPEN: &str = "<script type=\"text/javascript\">";
const SCRIPT_CLOSE: &str = "</script>";

/// Render the client script for a subscribe URL.
pub fn client_script(url: &str) -> String {
    let literal = serde_json::Value::String(url.to_owned())
        .to_string()
        .replace("</", "<\\/");
    CLIENT_SCRIPT.replace(URL_PLACEHOLDER, &literal)
}

/// Client script wrapped in a `<script>` element.
pub fn script_block(url: &str) -> String {
    format!("{SCRIPT_OPEN}\n{}\n{SCRIPT_CLOSE}", client_script(url))
}

/// Append the reload script to an HTML or plain-text body.
///
/// Returns the body and whether it was modified. Anything that does not
/// sniff as HTML or plain text is returned untouched. Rewriting an already
/// rewritten body appends a second script.
pub fn rewrite(mut body: Vec<u8>, url: &str) -> (Vec<u8>, bool) {
    if !sniff(&body).is_injectable() {
        return (body, false);
    }
    body.extend_from_slice(script_block(url).as_bytes());
    (body, true)
}
