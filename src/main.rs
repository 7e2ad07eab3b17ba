//! Purpose: `annorpc` CLI entry point; calls genome annotation procedures from the shell.
//! Role: Binary crate root; parses args, builds one client, runs one call, emits JSON on stdout.
//! Invariants: Results are JSON on stdout; errors are JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logs go to stderr via `tracing` (`RUST_LOG`, default `warn`).
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use annorpc::api::{
    ClientBuilder, Error, ErrorKind, GenomeAnnotationClient, Raw, RpcClient, RpcContext,
    SERVICE_NAME, to_exit_code,
};

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(());
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `annorpc --help`."));
            }
        },
    };

    init_tracing();

    if let Command::Completion { shell } = cli.command {
        let mut command = Cli::command();
        clap_complete::aot::generate(shell, &mut command, "annorpc", &mut io::stdout());
        return Ok(());
    }

    let client = build_client(&cli.connection)?;
    let value = dispatch_command(cli.command, &client)?;
    emit_json(&value);
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "annorpc",
    version,
    about = "Call genome annotation service procedures over JSON-RPC",
    long_about = None,
    after_help = r#"EXAMPLES
  $ annorpc --url https://kbase.us/services/genome_annotation_api taxon "ReferenceGenomeAnnotations/kb|g.140057"
  $ annorpc --url https://host/rpc --token-file ~/.kbase_token features REF 'kb|g.140057.CDS.2901'
  $ annorpc --url https://host/rpc call get_feature_types --params '["REF"]'
  $ annorpc --url https://host/rpc --capture-response out.json call svc.big_method --params '[]'"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConnectionArgs {
    #[arg(long, global = true, help = "Service endpoint URL", value_hint = ValueHint::Url)]
    url: Option<String>,
    #[arg(
        long,
        global = true,
        conflicts_with_all = ["token_file", "user"],
        help = "Bearer token (validated against the auth service)"
    )]
    token: Option<String>,
    #[arg(
        long,
        global = true,
        conflicts_with = "user",
        help = "Read the bearer token from a file",
        value_hint = ValueHint::FilePath
    )]
    token_file: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        requires = "password_file",
        help = "User name to log in with"
    )]
    user: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Read the password for --user from a file",
        value_hint = ValueHint::FilePath
    )]
    password_file: Option<PathBuf>,
    #[arg(long, global = true, help = "Auth service base URL", value_hint = ValueHint::Url)]
    auth_url: Option<String>,
    #[arg(
        long,
        global = true,
        help = "Trust only the CA certificates in this PEM file",
        value_hint = ValueHint::FilePath
    )]
    tls_ca: Option<PathBuf>,
    #[arg(long, global = true, help = "Read timeout in milliseconds (0 = none)")]
    timeout_ms: Option<u64>,
    #[arg(long, global = true, help = "Allow plain http endpoints")]
    insecure_http: bool,
    #[arg(
        long,
        global = true,
        help = "Skip TLS certificate verification (unsafe; test environments only)"
    )]
    trust_all_certs: bool,
    #[arg(long, global = true, help = "Send request bodies with chunked streaming")]
    stream: bool,
    #[arg(
        long,
        global = true,
        help = "Write the raw response body to this file",
        value_hint = ValueHint::FilePath
    )]
    capture_response: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Call any procedure and print element 0 of its result",
        after_help = r#"Method names without a dot are qualified with the genome_annotaiton_api service."#
    )]
    Call {
        #[arg(help = "Procedure name, e.g. genome_annotaiton_api.get_taxon")]
        method: String,
        #[arg(long, default_value = "[]", help = "Positional arguments as a JSON array")]
        params: String,
        #[arg(long, help = "Call context as a JSON object")]
        context: Option<String>,
    },
    #[command(about = "Print the Taxon reference of an annotation object")]
    Taxon {
        #[arg(help = "Annotation object reference")]
        object_ref: String,
    },
    #[command(about = "Print the Assembly reference of an annotation object")]
    Assembly {
        #[arg(help = "Annotation object reference")]
        object_ref: String,
    },
    #[command(about = "Print feature records by id")]
    Features {
        #[arg(help = "Annotation object reference")]
        object_ref: String,
        #[arg(required = true, help = "Feature ids")]
        ids: Vec<String>,
    },
    #[command(about = "Map mRNA ids to their CDS ids")]
    CdsByMrna {
        #[arg(help = "Annotation object reference")]
        object_ref: String,
        #[arg(required = true, help = "mRNA ids")]
        ids: Vec<String>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn build_client(args: &ConnectionArgs) -> Result<RpcClient, Error> {
    let Some(url) = args.url.as_deref() else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("missing --url")
            .with_hint("Pass the service endpoint, e.g. --url https://host/services/genome_annotation_api"));
    };
    let mut builder = ClientBuilder::new(url)
        .read_timeout(args.timeout_ms.map(Duration::from_millis))
        .insecure_http_allowed(args.insecure_http)
        .trust_all_certificates(args.trust_all_certs)
        .streaming(args.stream);
    if let Some(auth_url) = &args.auth_url {
        builder = builder.auth_url(auth_url.clone());
    }
    if let Some(path) = &args.tls_ca {
        builder = builder.tls_ca_file(path.clone());
    }
    if let Some(token) = &args.token {
        builder = builder.token(token.clone());
    } else if let Some(path) = &args.token_file {
        builder = builder.token(read_secret(path, "token")?);
    } else if let Some(user) = &args.user {
        let Some(path) = &args.password_file else {
            return Err(Error::new(ErrorKind::Usage).with_message("--user requires --password-file"));
        };
        builder = builder.user_password(user.clone(), read_secret(path, "password")?);
    }

    let client = builder.build()?;
    if let Some(path) = &args.capture_response {
        client.set_file_for_next_response(path.clone());
    }
    Ok(client)
}

fn read_secret(path: &Path, what: &str) -> Result<String, Error> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read {what} file"))
            .with_path(path)
            .with_source(err)
    })?;
    let secret = text.trim();
    if secret.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{what} file is empty"))
            .with_path(path));
    }
    Ok(secret.to_string())
}

fn dispatch_command(command: Command, client: &RpcClient) -> Result<Value, Error> {
    let genome = GenomeAnnotationClient::new(client.clone());
    match command {
        Command::Call {
            method,
            params,
            context,
        } => {
            let params = parse_json_arg::<Value>(&params, "--params")?;
            if !params.is_array() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--params must be a JSON array"));
            }
            let context = context
                .map(|raw| parse_json_arg::<Map<String, Value>>(&raw, "--context"))
                .transpose()?
                .map(RpcContext::from);
            let method = qualify_method(&method);
            client.invoke(&method, &params, &Raw, context.as_ref())
        }
        Command::Taxon { object_ref } => Ok(json!(genome.get_taxon(&object_ref, None)?)),
        Command::Assembly { object_ref } => Ok(json!(genome.get_assembly(&object_ref, None)?)),
        Command::Features { object_ref, ids } => to_json(genome.get_features(&object_ref, &ids, None)?),
        Command::CdsByMrna { object_ref, ids } => {
            to_json(genome.get_cds_by_mrna(&object_ref, &ids, None)?)
        }
        Command::Completion { .. } => Ok(Value::Null),
    }
}

fn qualify_method(method: &str) -> String {
    if method.contains('.') {
        method.to_string()
    } else {
        format!("{SERVICE_NAME}.{method}")
    }
}

fn parse_json_arg<T: serde::de::DeserializeOwned>(raw: &str, flag: &str) -> Result<T, Error> {
    serde_json::from_str(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{flag} is not valid JSON"))
            .with_source(err)
    })
}

fn to_json(value: impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Protocol)
            .with_message("failed to encode result as json")
            .with_source(err)
    })
}

fn emit_json(value: &Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Protocol\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Transport => "transport error".to_string(),
        ErrorKind::Authorization => "authorization failed".to_string(),
        ErrorKind::Protocol => "protocol error".to_string(),
        ErrorKind::Construction => "client construction failed".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    inner.insert("retryable".to_string(), json!(err.kind().is_retryable()));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(method) = err.method() {
        inner.insert("method".to_string(), json!(method));
    }
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    if let Some(name) = err.name() {
        inner.insert("name".to_string(), json!(name));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(trace) = err.trace() {
        inner.insert("trace".to_string(), json!(trace));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(method) = err.method() {
        lines.push(format!("method: {method}"));
    }
    if let Some(code) = err.code() {
        lines.push(format!("code: {code}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    if let Some(trace) = err.trace() {
        lines.push(format!("server trace:\n{trace}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{error_json, qualify_method};
    use annorpc::api::{Error, ErrorKind};

    #[test]
    fn bare_method_names_are_qualified() {
        assert_eq!(
            qualify_method("get_taxon"),
            "genome_annotaiton_api.get_taxon"
        );
        assert_eq!(qualify_method("svc.get_widget"), "svc.get_widget");
    }

    #[test]
    fn error_json_carries_remote_fields() {
        let err = Error::new(ErrorKind::Protocol)
            .with_message("method not found")
            .with_code(-32601)
            .with_method("svc.m");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], "Protocol");
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["error"]["method"], "svc.m");
        assert_eq!(value["error"]["retryable"], false);
        assert!(value["error"].get("trace").is_none());
    }

    #[test]
    fn error_json_carries_server_trace() {
        let err = Error::new(ErrorKind::Protocol)
            .with_message("boom")
            .with_trace("Traceback (most recent call last):\n  ...");
        let value = error_json(&err);
        assert_eq!(
            value["error"]["trace"],
            "Traceback (most recent call last):\n  ..."
        );
    }
}
