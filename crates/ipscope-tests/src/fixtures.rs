//! Mock origin and lookup API fixtures.

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Application shell served by the mock origin.
pub const SHELL_HTML: &str = "<!doctype html><title>ipscope</title>";
pub const SHELL_CSS: &str = "body { font-family: Inter; }";

/// Lookup document for `ip`.
pub fn lookup_body(ip: &str) -> Value {
    json!({
        "ip": ip,
        "hostname": "host.example.net",
        "city": "Lisbon",
        "region": "Lisbon",
        "country": "PT",
        "org": "AS64500 Example",
        "timezone": "Europe/Lisbon"
    })
}

/// Serve the application shell: `/` and `/style.css`.
pub async fn mount_shell(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(SHELL_HTML)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(SHELL_CSS)
                .insert_header("content-type", "text/css"),
        )
        .mount(server)
        .await;
}

/// Serve a font stylesheet at `/css2` with the given body.
pub async fn mount_font_css(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/css2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/css"),
        )
        .mount(server)
        .await;
}

/// Serve `{ip: ...}` on the lookup API's `/json` and plain text on `/ip`.
pub async fn mount_lookup(server: &MockServer, ip: &str) {
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(lookup_body(ip)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}\n", ip)))
        .mount(server)
        .await;
}
