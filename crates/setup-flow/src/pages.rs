//! HTML pages served by the setup listener
//!
//! Both pages are self-contained (inline CSS and script) so the strict CSP
//! can forbid every external source. Dynamic values are HTML-escaped.

/// Content-Security-Policy applied to every HTML response.
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; script-src 'unsafe-inline'; \
     style-src 'unsafe-inline'; connect-src 'self'; form-action 'none'; \
     frame-ancestors 'none'; base-uri 'none'";

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; background: #f5f6f8; color: #1f2328; margin: 0; }
main { max-width: 28rem; margin: 4rem auto; background: #fff; padding: 2rem; border-radius: 8px; box-shadow: 0 1px 4px rgba(0,0,0,.1); }
h1 { font-size: 1.4rem; margin-top: 0; }
label { display: block; margin-top: 1rem; font-weight: 600; }
input { width: 100%; box-sizing: border-box; padding: .5rem; margin-top: .25rem; border: 1px solid #c8ccd1; border-radius: 4px; }
.buttons { margin-top: 1.5rem; display: flex; gap: .5rem; }
button { padding: .55rem 1rem; border: 0; border-radius: 4px; cursor: pointer; }
button.primary { background: #1f6feb; color: #fff; }
#status { margin-top: 1rem; min-height: 1.2rem; }
.error { color: #cf222e; }
.ok { color: #1a7f37; }
"#;

/// Setup form. `csrf_token` is echoed back by the script on every POST.
pub fn setup_page(csrf_token: &str) -> String {
    let token = escape_html(csrf_token);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>API credential setup</title>
<style>{STYLE}</style>
</head>
<body>
<main>
<h1>Connect your API account</h1>
<form id="setup" autocomplete="off">
  <label for="account_name">Account name</label>
  <input id="account_name" name="account_name" maxlength="64" pattern="[A-Za-z0-9_-]+" required>
  <label for="client_id">Client ID</label>
  <input id="client_id" name="client_id" maxlength="128" required>
  <label for="api_key">API key</label>
  <input id="api_key" name="api_key" type="password" maxlength="256" required>
  <label for="account_id">Account ID (optional)</label>
  <input id="account_id" name="account_id">
  <div class="buttons">
    <button type="button" id="test">Test connection</button>
    <button type="submit" class="primary">Save</button>
  </div>
</form>
<div id="status" role="status"></div>
</main>
<script>
const CSRF_TOKEN = "{token}";
const form = document.getElementById("setup");
const status = document.getElementById("status");

function payload() {{
  return JSON.stringify({{
    account_name: form.account_name.value.trim(),
    client_id: form.client_id.value.trim(),
    api_key: form.api_key.value.trim(),
    account_id: form.account_id.value.trim() || null,
  }});
}}

function show(message, ok) {{
  status.textContent = message;
  status.className = ok ? "ok" : "error";
}}

async function post(path) {{
  const res = await fetch(path, {{
    method: "POST",
    headers: {{ "Content-Type": "application/json", "X-CSRF-Token": CSRF_TOKEN }},
    body: payload(),
  }});
  let body = {{}};
  try {{ body = await res.json(); }} catch (_) {{}}
  if (!res.ok && !body.error) {{
    body.error = "request failed (" + res.status + ")";
  }}
  return body;
}}

document.getElementById("test").addEventListener("click", async () => {{
  show("Testing credentials...", true);
  const body = await post("/validate");
  show(body.success ? (body.message || "Credentials are valid") : body.error, body.success);
}});

form.addEventListener("submit", async (event) => {{
  event.preventDefault();
  show("Saving credentials...", true);
  const body = await post("/submit");
  if (body.success) {{
    window.location.assign("/success");
  }} else {{
    show(body.error, false);
  }}
}});
</script>
</body>
</html>
"#
    )
}

/// Success page. `account_name` comes from server-held state only.
///
/// The completion beacon is only emitted once a result is stored, so
/// reopening this page early (history, a stray tab) cannot end the flow.
pub fn success_page(account_name: Option<&str>, csrf_token: &str) -> String {
    let (message, script) = match account_name {
        Some(name) => (
            format!(
                "<h1>Setup complete</h1><p class=\"ok\">Credentials for <strong>{}</strong> were saved. You can close this window and return to your terminal.</p>",
                escape_html(name)
            ),
            format!(
                r#"<script>
fetch("/complete", {{
  method: "POST",
  headers: {{ "X-CSRF-Token": "{}" }},
  keepalive: true,
}});
</script>"#,
                escape_html(csrf_token)
            ),
        ),
        None => (
            "<h1>Setup not finished</h1><p class=\"error\">No credentials have been saved yet. <a href=\"/\">Return to the setup form</a> to enter them.</p>".to_string(),
            String::new(),
        ),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>API credential setup</title>
<style>{STYLE}</style>
</head>
<body>
<main>
{message}
</main>
{script}
</body>
</html>
"#
    )
}

/// Escape the five HTML-significant characters.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
