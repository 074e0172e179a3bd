// Command-line adapter for the mutual-credit ledger.
//
// This is the thin surface the engine is designed to sit behind: each
// subcommand maps to one engine call with the acting member's ID first,
// and error messages are rendered straight back to the user. All real
// checks live in the engine.

use anyhow::{bail, Context, Result};
use std::env;

use mutual_credit::{AccountLimits, CreditEngine, Offer, Transaction};

const USAGE: &str = "\
mutual-credit <command> [args]

Accounts:
  create-account <member> [min max]   open an account (default range -1000..1000)
  balance <member>                    balance, available credit, pending totals
  delete-account <member>             admin removal; refused while in use

Offers:
  create-offer <seller> <price> <title> [description]
  offers <seller>                     list a member's offers
  browse <tag>                        list offers carrying a tag
  delete-offer <seller> <offer-id>
  tag <seller> <offer-id> <tag>...
  untag <seller> <offer-id> <tag>...

Transactions:
  buy <buyer> <offer-id>              open a PENDING buy request
  approve <seller> <tx-id>...         seller approves; credit moves here
  cancel <buyer> <tx-id>
  deny <seller> <tx-id>
  pending <member>                    open buys and sales for a member
  show <id>                           dump an offer or transaction as JSON

Database path comes from MUTUAL_CREDIT_DB (default: mutual_credit.db).";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        println!("{USAGE}");
        return Ok(());
    }

    let db_path = env::var("MUTUAL_CREDIT_DB").unwrap_or_else(|_| "mutual_credit.db".to_string());
    let mut engine = CreditEngine::open(&db_path)
        .with_context(|| format!("failed to open ledger at {db_path}"))?;

    let command = args[0].as_str();
    let rest = &args[1..];

    match command {
        "create-account" => {
            let member = arg(rest, 0, "member")?;
            if rest.len() >= 3 {
                let min: i64 = rest[1].parse().context("min must be an integer")?;
                let max: i64 = rest[2].parse().context("max must be an integer")?;
                engine.create_account_with_limits(member, AccountLimits::new(min, max))?;
            } else {
                engine.create_account(member)?;
            }
            println!("✓ Account created for {member}");
        }
        "balance" => {
            let member = arg(rest, 0, "member")?;
            let balance = engine.balance(member)?;
            let limits = engine.account_limits(member)?;
            let available = engine.available_balance(member)?;
            let pending_in = engine.total_pending_credits(member)?;
            let pending_out = engine.total_pending_debits(member)?;

            println!("Account {member}");
            println!("  balance:          {balance}");
            println!("  range:            [{}, {}]", limits.min_balance, limits.max_balance);
            println!("  available credit: {available}");
            println!("  pending incoming: {pending_in}");
            println!("  pending outgoing: {pending_out}");
        }
        "delete-account" => {
            let member = arg(rest, 0, "member")?;
            engine.delete_account(member)?;
            println!("✓ Account {member} deleted");
        }
        "create-offer" => {
            let seller = arg(rest, 0, "seller")?;
            let price: i64 = arg(rest, 1, "price")?.parse().context("price must be an integer")?;
            let title = arg(rest, 2, "title")?;
            let description = rest.get(3).map(String::as_str).unwrap_or("");
            let offer_id = engine.create_offer(seller, description, price, title)?;
            println!("✓ Offer {offer_id} listed at {price}");
        }
        "offers" => {
            let seller = arg(rest, 0, "seller")?;
            let offers = engine.offers_by_seller(seller)?;
            if offers.is_empty() {
                println!("No offers from {seller}");
            }
            for offer in offers {
                print_offer(&engine, &offer)?;
            }
        }
        "browse" => {
            let tag = arg(rest, 0, "tag")?;
            let offers = engine.offers_by_tag(tag)?;
            if offers.is_empty() {
                println!("No offers tagged '{tag}'");
            }
            for offer in offers {
                print_offer(&engine, &offer)?;
            }
        }
        "delete-offer" => {
            let seller = arg(rest, 0, "seller")?;
            let offer_id = arg(rest, 1, "offer-id")?;
            engine.delete_offer(seller, offer_id)?;
            println!("✓ Offer {offer_id} deleted");
        }
        "tag" | "untag" => {
            let seller = arg(rest, 0, "seller")?;
            let offer_id = arg(rest, 1, "offer-id")?;
            let tags: Vec<String> = rest[2..].to_vec();
            if tags.is_empty() {
                bail!("missing argument: tag");
            }
            let result = if command == "tag" {
                engine.add_tags(seller, offer_id, &tags)?
            } else {
                engine.remove_tags(seller, offer_id, &tags)?
            };
            println!("✓ Tags for {offer_id}: {}", result.join(", "));
        }
        "buy" => {
            let buyer = arg(rest, 0, "buyer")?;
            let offer_id = arg(rest, 1, "offer-id")?;
            let tx_id = engine.create_transaction(buyer, offer_id)?;
            println!("✓ Buy request {tx_id} is pending seller approval");
        }
        "approve" => {
            let seller = arg(rest, 0, "seller")?;
            let tx_ids: Vec<String> = rest[1..].to_vec();
            if tx_ids.is_empty() {
                bail!("missing argument: tx-id");
            }
            // batch: each ID succeeds or fails on its own
            for (tx_id, outcome) in engine.approve_transactions(seller, &tx_ids) {
                match outcome {
                    Ok(()) => println!("✓ Approved {tx_id}"),
                    Err(e) => println!("✗ {tx_id}: {e}"),
                }
            }
        }
        "cancel" => {
            let buyer = arg(rest, 0, "buyer")?;
            let tx_id = arg(rest, 1, "tx-id")?;
            engine.cancel_transaction(buyer, tx_id)?;
            println!("✓ Cancelled {tx_id}");
        }
        "deny" => {
            let seller = arg(rest, 0, "seller")?;
            let tx_id = arg(rest, 1, "tx-id")?;
            engine.deny_transaction(seller, tx_id)?;
            println!("✓ Denied {tx_id}");
        }
        "pending" => {
            let member = arg(rest, 0, "member")?;
            let buys = engine.pending_buys(member)?;
            let sales = engine.pending_sales(member)?;

            println!("Pending buys ({}):", buys.len());
            for tx in &buys {
                print_transaction(&engine, tx)?;
            }
            println!("Pending sales ({}):", sales.len());
            for tx in &sales {
                print_transaction(&engine, tx)?;
            }
        }
        "show" => {
            let id = arg(rest, 0, "id")?;
            if let Ok(offer) = engine.offer(id) {
                println!("{}", serde_json::to_string_pretty(&offer)?);
            } else {
                let tx = engine.transaction(id)?;
                println!("{}", serde_json::to_string_pretty(&tx)?);
            }
        }
        "help" | "--help" | "-h" => println!("{USAGE}"),
        other => bail!("unknown command '{other}'\n\n{USAGE}"),
    }

    Ok(())
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .with_context(|| format!("missing argument: {name}"))
}

fn print_offer(engine: &CreditEngine, offer: &Offer) -> Result<()> {
    let tags = engine.tags(&offer.id)?;
    let tag_note = if tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", tags.join(", "))
    };
    println!("  {}  {:>6}  {}{}", offer.id, offer.price, offer.title, tag_note);
    if !offer.description.is_empty() {
        println!("      {}", offer.description);
    }
    Ok(())
}

fn print_transaction(engine: &CreditEngine, tx: &Transaction) -> Result<()> {
    let offer = engine.offer(&tx.offer_id)?;
    println!(
        "  {}  '{}' at {}  buyer {} -> seller {}  since {}",
        tx.id,
        offer.title,
        offer.price,
        tx.buyer_id,
        offer.seller_id,
        tx.created_at.format("%Y-%m-%d %H:%M"),
    );
    Ok(())
}
