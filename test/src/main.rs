use std::error::Error;
use std::sync::Arc;

use clap::Parser;
use http::StatusCode;
use serde_json::json;
use stick_http::{
    external::dotenv::dotenv, handler_fn, Accept, Application, BoxHandler, Handler, ParamValue,
    Request, Response, ResponseUtil, Server,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "stick-demo")]
#[command(about = "Echoes request parameters through the cookies/params/etag/gzip chain", long_about = None)]
struct Cli {
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Interceptors to enable, outermost first.
    #[arg(short, long, value_delimiter = ',', default_value = "cookies,params,etag,gzip")]
    middleware: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stick_http=debug,test=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let address = format!("0.0.0.0:{}", cli.port);
    let mut server = Server::new(&address).await?;

    let mut app = Application::with_options(server.options.clone());
    let names: Vec<&str> = cli.middleware.iter().map(String::as_str).collect();
    app.configure(&names)?;
    let handler = app.build(handler_fn(echo))?;

    tracing::info!("start server on: {} with {:?}", address, app.middleware_names());
    loop {
        let accept = match server.accept().await {
            Ok(accept) => accept,
            Err(e) => {
                tracing::warn!("failed to accept connection: {e:?}");
                continue;
            }
        };
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(e) = serve(accept, handler).await {
                tracing::warn!("an error occured; error = {:?}", e);
            }
        });
    }
}

async fn serve(
    accept: Accept,
    handler: BoxHandler,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let (mut request, mut writer) = accept.parse_request().await?;
    tracing::info!("{} {}", request.method, request.uri);

    let response = match handler.call(&mut request).await {
        Ok(response) => response,
        Err(e) if e.is_malformed_multipart() => {
            Response::text(e.to_string()).with_status(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            tracing::warn!("handler failed: {}", e);
            Response::text("internal error").with_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    response.responser(&mut writer).await
}

fn echo(request: &mut Request) -> stick_http::Result<Response> {
    // file contents are summarised, not echoed
    let params: serde_json::Map<String, serde_json::Value> = request
        .params
        .iter()
        .map(|(name, value)| (name.clone(), describe(value)))
        .collect();
    Response::json(&json!({
        "method": request.method.as_str(),
        "path": request.uri.path(),
        "cookies": request.cookies,
        "params": params,
    }))
}

fn describe(value: &ParamValue) -> serde_json::Value {
    match value {
        ParamValue::Text(text) => json!(text),
        ParamValue::File(file) => json!({
            "filename": file.filename,
            "contentType": file.content_type,
            "size": file.value.len(),
        }),
        ParamValue::List(values) => values.iter().map(describe).collect(),
    }
}
