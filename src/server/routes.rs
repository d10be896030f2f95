use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::routing::get;

use crate::auth::PopupMessage;
use crate::config::ClientConfig;

/// Router with `GET {redirect_uri path}` serving the callback page.
pub fn callback_routes(config: &ClientConfig) -> Router {
    let path = config.redirect_uri().path().to_string();
    let page: Arc<str> = render_callback_page(config.home_path()).into();
    tracing::debug!(path = %path, "Mounting OAuth callback route");

    Router::new()
        .route(&path, get(callback))
        .with_state(page)
}

async fn callback(State(page): State<Arc<str>>) -> Html<String> {
    Html(page.to_string())
}

/// Renders the callback page.
///
/// Opened as a popup, the page posts its full URL to the opener (targeted at
/// its own origin) and closes. Otherwise it goes to `home_path`, keeping the
/// query and fragment for the client to complete the sign-in.
#[must_use]
pub fn render_callback_page(home_path: &str) -> String {
    let message_type = serde_json::to_value(PopupMessage::AuthSuccess { url: String::new() })
        .ok()
        .and_then(|v| v.get("type").cloned())
        .unwrap_or_default();
    let home = script_literal(home_path);

    format!(
        r#"<!doctype html>
<html>
  <head><title>Authenticating...</title></head>
  <body>
    <script>
      if (window.opener) {{
        window.opener.postMessage(
          {{ type: {message_type}, url: window.location.href }},
          window.location.origin
        );
        window.close();
      }} else {{
        window.location.replace({home} + window.location.search + window.location.hash);
      }}
    </script>
    <p>Completing authentication... Please wait.</p>
  </body>
</html>
"#
    )
}

/// JSON string literal that cannot close the surrounding script element.
fn script_literal(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_posts_to_own_origin() {
        let page = render_callback_page("/");

        assert!(page.contains(r#"{ type: "OAUTH_AUTH_SUCCESS", url: window.location.href }"#));
        assert!(page.contains("window.location.origin\n"));
        assert!(!page.contains("'*'"));
        assert!(page.contains(r#"window.location.replace("/" + "#));
    }

    #[test]
    fn home_path_cannot_break_out_of_script() {
        let page = render_callback_page("/</script><script>alert(1)//");

        assert!(!page.contains("</script><script>"));
        assert!(page.contains(r#""/\u003c/script\u003e\u003cscript\u003ealert(1)//""#));
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn route_serves_page_at_redirect_path() {
        let config = ClientConfig::new(
            "https://project.backend.example".parse().unwrap(),
            "anon",
            "http://localhost:3000/auth/callback".parse().unwrap(),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, callback_routes(&config)).await.unwrap();
        });

        let response = reqwest::get(format!("http://{addr}/auth/callback")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.text().await.unwrap().contains("OAUTH_AUTH_SUCCESS"));

        let missing = reqwest::get(format!("http://{addr}/other")).await.unwrap();
        assert_eq!(missing.status(), 404);
    }
}
