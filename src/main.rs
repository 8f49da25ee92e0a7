//! context-gateway CLI entry point

use std::process::ExitCode;

use clap::Parser;

use context_gateway::cli::{Cli, Commands};
use context_gateway::commands::{
    init_tracing, run_domains, run_health, run_impact, run_maintenance, run_recover, run_serve,
    run_update, CommandContext, CommandOutput,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let ctx = match CommandContext::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };
    init_tracing(ctx.log_level());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(&cli, &ctx)) {
        Ok(output) => {
            print!("{}", output.text);
            output.exit_code
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

async fn run(cli: &Cli, ctx: &CommandContext) -> context_gateway::Result<CommandOutput> {
    match &cli.command {
        Commands::Serve => run_serve(ctx).await,
        Commands::Health => run_health(ctx).await,
        Commands::Update(args) => run_update(ctx, args).await,
        Commands::Impact(args) => run_impact(ctx, args).await,
        Commands::Domains(args) => run_domains(ctx, args).await,
        Commands::Maintenance => run_maintenance(ctx).await,
        Commands::Recover(args) => run_recover(ctx, args).await,
    }
}
