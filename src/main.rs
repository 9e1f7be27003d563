use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;
use trading_rl::{
    constants::{TICKERS, TRAINING_DATES},
    data::{FileSource, MarketDataSource, SyntheticSource},
    gym::Action,
    options::{
        implied_volatility, price_and_greeks, OptionContract, OptionLeg, OptionRight,
        StrategyAnalyzer,
    },
    types::EpisodeKey,
    DqnAgent, EngineConfig, TradingEnvironment, Trainer,
};

#[derive(Parser)]
#[command(name = "trading_rl")]
#[command(about = "DQN trading engine with Black-Scholes option analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Train {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long)]
        episodes: Option<usize>,

        #[arg(long, value_delimiter = ',')]
        tickers: Option<Vec<String>>,

        #[arg(long, value_delimiter = ',')]
        dates: Option<Vec<NaiveDate>>,

        #[arg(short = 'w', long)]
        checkpoint: Option<PathBuf>,

        /// Directory of `<TICKER>_<YYYY-MM-DD>.json` snapshots, synthetic prices when unset
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,

        #[arg(short, long, default_value_t = false)]
        resume: bool,
    },
    Infer {
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short = 'w', long)]
        checkpoint: Option<PathBuf>,

        #[arg(short, long)]
        ticker: String,

        #[arg(long)]
        date: NaiveDate,

        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        #[arg(short, long, default_value_t = 0)]
        seed: u64,
    },
    Price {
        #[arg(long, value_enum)]
        right: RightArg,

        #[arg(long)]
        spot: f64,

        #[arg(long)]
        strike: f64,

        /// Years to expiry
        #[arg(long)]
        expiry: f64,

        #[arg(long, default_value_t = 0.04)]
        rate: f64,

        #[arg(long)]
        volatility: f64,
    },
    Iv {
        #[arg(long, value_enum)]
        right: RightArg,

        #[arg(long)]
        spot: f64,

        #[arg(long)]
        strike: f64,

        #[arg(long)]
        expiry: f64,

        #[arg(long, default_value_t = 0.04)]
        rate: f64,

        /// Observed option price
        #[arg(long)]
        price: f64,
    },
    Strategy {
        strategy: String,

        /// Legs as `right:side:strike:premium`, e.g. `call:long:100:5`
        #[arg(required = true)]
        legs: Vec<OptionLeg>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RightArg {
    Call,
    Put,
}

impl From<RightArg> for OptionRight {
    fn from(right: RightArg) -> Self {
        match right {
            RightArg::Call => OptionRight::Call,
            RightArg::Put => OptionRight::Put,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    Ok(match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => EngineConfig::default(),
    })
}

fn market_source(data_dir: Option<PathBuf>, seed: u64) -> Box<dyn MarketDataSource> {
    match data_dir {
        Some(dir) => Box::new(FileSource::new(dir)),
        None => Box::new(SyntheticSource::new(seed)),
    }
}

fn default_dates() -> anyhow::Result<Vec<NaiveDate>> {
    TRAINING_DATES
        .iter()
        .map(|date| date.parse::<NaiveDate>().with_context(|| format!("bad default date {date}")))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn train(
    config: Option<PathBuf>,
    episodes: Option<usize>,
    tickers: Option<Vec<String>>,
    dates: Option<Vec<NaiveDate>>,
    checkpoint: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    seed: u64,
    resume: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config.as_ref())?;
    if let Some(episodes) = episodes {
        config.trainer.episodes = episodes;
    }
    if let Some(checkpoint) = checkpoint {
        config.trainer.checkpoint_path = checkpoint;
    }
    config.agent.seed = config.agent.seed.or(Some(seed));
    config.validate()?;

    let tickers = tickers.unwrap_or_else(|| TICKERS.iter().map(|ticker| ticker.to_string()).collect());
    let dates = match dates {
        Some(dates) => dates,
        None => default_dates()?,
    };
    let keys = EpisodeKey::cartesian(&tickers, &dates);

    let agent = if resume {
        let (agent, error) = DqnAgent::load_or_fresh(config.agent.clone(), &config.trainer.checkpoint_path)?;
        if let Some(error) = error {
            println!("{} {error}", "Starting from an untrained agent:".yellow());
        }
        agent
    } else {
        DqnAgent::new(config.agent.clone())?
    };

    println!(
        "Training {} episodes over {} ticker/date pairs",
        config.trainer.episodes,
        keys.len()
    );
    let mut trainer = Trainer::new(&config, market_source(data_dir, seed), agent, keys)?;
    let report = trainer.run()?;

    let stats = report.stats;
    println!("Episodes: {}", stats.total_episodes);
    println!("Average reward (last 100): {:.4}", stats.average_reward);
    println!("Average loss (last 100): {:.6}", stats.average_loss);
    println!("Epsilon: {:.4}", stats.epsilon);
    if !report.skipped.is_empty() {
        println!("{} {}", "Skipped episodes:".yellow(), report.skipped.len());
    }
    println!("Checkpoint: {}", config.trainer.checkpoint_path.display());
    Ok(())
}

fn infer(
    config: Option<PathBuf>,
    checkpoint: Option<PathBuf>,
    ticker: String,
    date: NaiveDate,
    data_dir: Option<PathBuf>,
    seed: u64,
) -> anyhow::Result<()> {
    let config = load_config(config.as_ref())?;
    let checkpoint = checkpoint.unwrap_or_else(|| config.trainer.checkpoint_path.clone());

    let (agent, error) = DqnAgent::load_or_fresh(config.agent.clone(), &checkpoint)?;
    if let Some(error) = error {
        println!("{} {error}", "Using an untrained agent:".yellow());
    }

    let mut env = TradingEnvironment::new(&config, market_source(data_dir, seed));
    let state = env.reset(&ticker, date)?;

    let values = agent.q_values(&state);
    let probabilities = agent.get_all_action_probabilities(&state);
    let best = agent.greedy_action(&state);

    println!("{} {ticker} @ {date}", "Decision for".bold());
    for action in Action::ALL {
        let line = format!(
            "{:<5} value {:>10.4}  softmax {:>6.2}%",
            action.to_string(),
            values[action],
            probabilities[action] * 100.0
        );
        if action == best {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    println!(
        "{}",
        "Softmax-normalized action values, not probabilities of profit".dimmed()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("{}", "Start".green());

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            config,
            episodes,
            tickers,
            dates,
            checkpoint,
            data_dir,
            seed,
            resume,
        } => train(config, episodes, tickers, dates, checkpoint, data_dir, seed, resume)?,
        Commands::Infer {
            config,
            checkpoint,
            ticker,
            date,
            data_dir,
            seed,
        } => infer(config, checkpoint, ticker, date, data_dir, seed)?,
        Commands::Price {
            right,
            spot,
            strike,
            expiry,
            rate,
            volatility,
        } => {
            let contract = OptionContract::new(right.into(), spot, strike, expiry, rate, volatility);
            let (price, greeks) = price_and_greeks(&contract)?;
            println!("Price: {price:.4}");
            println!("Delta: {:.4}", greeks.delta);
            println!("Gamma: {:.4}", greeks.gamma);
            println!("Theta: {:.4} per day", greeks.theta);
            println!("Vega:  {:.4} per vol point", greeks.vega);
            println!("Rho:   {:.4} per rate point", greeks.rho);
        }
        Commands::Iv {
            right,
            spot,
            strike,
            expiry,
            rate,
            price,
        } => {
            let contract = OptionContract::new(right.into(), spot, strike, expiry, rate, 0.0);
            let sigma = implied_volatility(&contract, price)?;
            println!("Implied volatility: {sigma:.6} ({:.2}%)", sigma * 100.0);
        }
        Commands::Strategy { strategy, legs } => {
            let analysis = StrategyAnalyzer::default().analyze(&strategy, &legs)?;
            let bound = |value: Option<f64>| value.map_or("unbounded".to_string(), |value| format!("{value:.4}"));
            println!("Strategy: {}", analysis.strategy);
            println!("Max profit: {}", bound(analysis.max_profit));
            println!("Max loss: {}", bound(analysis.max_loss));
            println!("Breakevens: {:?}", analysis.breakevens);
        }
    }

    println!("{}", "End".green());
    Ok(())
}
