//! Marketstall CLI - drive a local shopping session from the terminal.
//!
//! Every invocation opens a session over the configured data directory,
//! runs one command and exits. State lives in the file slot between runs.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! ms-cli catalog list
//!
//! # Fill the cart
//! ms-cli cart add 3 --quantity 2
//! ms-cli cart show
//!
//! # Save a shipping address and payment method, then check out
//! ms-cli --user 1 address add "Home" "1 Main St" Springfield IL 62701
//! ms-cli --user 1 payment add-paypal jane@example.com
//! ms-cli --user 1 checkout
//!
//! # Request a refund for two items and resolve it
//! ms-cli --user 1 refund submit 1 --item 3 --item 5 --reason "Arrived damaged"
//! ms-cli --user 1 --admin refund approve 1
//! ```
//!
//! # Commands
//!
//! - `catalog` - List products
//! - `cart` - Show and edit the cart
//! - `address`, `payment` - Manage saved addresses and payment methods
//! - `checkout` - Place an order for the cart
//! - `orders` - Order history and fulfillment updates
//! - `refund` - Submit, list and resolve refund requests

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{SessionOptions, cart, orders, profile};

#[derive(Parser)]
#[command(name = "ms-cli")]
#[command(author, version, about = "Marketstall local session tools")]
struct Cli {
    /// Act as this signed-in user (anonymous if omitted)
    #[arg(short, long, global = true)]
    user: Option<i32>,

    /// Sign in with the admin role
    #[arg(long, global = true, requires = "user")]
    admin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Show and edit the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Manage saved shipping addresses
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Manage saved payment methods
    Payment {
        #[command(subcommand)]
        action: PaymentAction,
    },
    /// Place an order for the cart's contents
    Checkout {
        /// Shipping address ID (default address if omitted)
        #[arg(long)]
        address: Option<i32>,

        /// Payment method ID (default payment method if omitted)
        #[arg(long)]
        payment: Option<i32>,
    },
    /// Order history and fulfillment updates
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
    /// Refund requests
    Refund {
        #[command(subcommand)]
        action: RefundAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// List every product with price and stock
    List,
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart lines and total
    Show,
    /// Add a product to the cart
    Add {
        /// Product ID
        product: i32,

        /// Units to add
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (zero or less removes it)
    Set {
        /// Product ID
        product: i32,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove a product from the cart
    Remove {
        /// Product ID
        product: i32,
    },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum AddressAction {
    /// List saved addresses
    List,
    /// Save a new address
    Add {
        /// Recipient name
        name: String,
        street: String,
        city: String,
        state: String,
        zip_code: String,

        #[arg(long, default_value = "US")]
        country: String,

        /// Make this the default address
        #[arg(long)]
        default: bool,
    },
    /// Make an address the default
    Default { id: i32 },
    /// Delete an address
    Delete { id: i32 },
}

#[derive(Subcommand)]
enum PaymentAction {
    /// List saved payment methods
    List,
    /// Save a credit card
    AddCard {
        /// Name on the card
        cardholder_name: String,

        /// Last four digits
        last_four: String,

        /// Expiry month (1-12)
        expiry_month: u8,

        /// Expiry year
        expiry_year: u16,

        #[arg(long)]
        default: bool,
    },
    /// Save a `PayPal` account
    AddPaypal {
        /// `PayPal` account email
        email: String,

        #[arg(long)]
        default: bool,
    },
    /// Save a bank account
    AddBank {
        account_name: String,
        bank_name: String,

        /// Last four digits of the account number
        account_last_four: String,

        #[arg(long)]
        default: bool,
    },
    /// Make a payment method the default
    Default { id: i32 },
    /// Delete a payment method
    Delete { id: i32 },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders, newest first
    List,
    /// Show one order with its refund requests
    Show { id: i32 },
    /// Record a fulfillment status (`processing`, `shipped`, `delivered`, `canceled`)
    Update {
        id: i32,
        status: String,

        /// Carrier tracking number
        #[arg(short, long)]
        tracking: Option<String>,
    },
}

#[derive(Subcommand)]
enum RefundAction {
    /// Request a refund for some of an order's items
    Submit {
        /// Order ID
        order: i32,

        /// Product ID of an item to refund (repeatable)
        #[arg(short, long = "item", required = true)]
        items: Vec<i32>,

        /// Why the refund is requested (at least 10 characters)
        #[arg(short, long)]
        reason: String,
    },
    /// List refund requests across all orders
    List,
    /// Approve a pending refund request
    Approve { id: i32 },
    /// Reject a pending refund request
    Reject { id: i32 },
}

#[tokio::main]
async fn main() {
    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marketstall_engine=info,marketstall_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let options = SessionOptions {
        user_id: cli.user,
        admin: cli.admin,
    };
    let mut session = commands::open_session(options).await?;

    match cli.command {
        Commands::Catalog { action } => match action {
            CatalogAction::List => cart::list_catalog(&session).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => cart::show(&session),
            CartAction::Add { product, quantity } => {
                cart::add(&mut session, product, quantity).await?;
            }
            CartAction::Set { product, quantity } => {
                cart::set(&mut session, product, quantity).await?;
            }
            CartAction::Remove { product } => cart::remove(&mut session, product)?,
            CartAction::Clear => cart::clear(&mut session)?,
        },
        Commands::Address { action } => match action {
            AddressAction::List => profile::list_addresses(&session)?,
            AddressAction::Add {
                name,
                street,
                city,
                state,
                zip_code,
                country,
                default,
            } => {
                let draft = marketstall_core::NewAddress {
                    name,
                    street,
                    city,
                    state,
                    zip_code,
                    country,
                    is_default: default,
                };
                profile::add_address(&mut session, draft)?;
            }
            AddressAction::Default { id } => profile::default_address(&mut session, id)?,
            AddressAction::Delete { id } => profile::delete_address(&mut session, id)?,
        },
        Commands::Payment { action } => match action {
            PaymentAction::List => profile::list_payment_methods(&session)?,
            PaymentAction::AddCard {
                cardholder_name,
                last_four,
                expiry_month,
                expiry_year,
                default,
            } => {
                let details = marketstall_core::PaymentDetails::CreditCard {
                    cardholder_name,
                    last_four,
                    expiry_month,
                    expiry_year,
                };
                profile::add_payment_method(&mut session, details, default)?;
            }
            PaymentAction::AddPaypal { email, default } => {
                let details = marketstall_core::PaymentDetails::PayPal {
                    email: email.parse()?,
                };
                profile::add_payment_method(&mut session, details, default)?;
            }
            PaymentAction::AddBank {
                account_name,
                bank_name,
                account_last_four,
                default,
            } => {
                let details = marketstall_core::PaymentDetails::BankTransfer {
                    account_name,
                    bank_name,
                    account_last_four,
                };
                profile::add_payment_method(&mut session, details, default)?;
            }
            PaymentAction::Default { id } => profile::default_payment_method(&mut session, id)?,
            PaymentAction::Delete { id } => profile::delete_payment_method(&mut session, id)?,
        },
        Commands::Checkout { address, payment } => {
            orders::checkout(&mut session, address, payment).await?;
        }
        Commands::Orders { action } => match action {
            OrdersAction::List => orders::list(&session)?,
            OrdersAction::Show { id } => orders::show(&session, id)?,
            OrdersAction::Update {
                id,
                status,
                tracking,
            } => orders::update(&mut session, id, &status, tracking).await?,
        },
        Commands::Refund { action } => match action {
            RefundAction::Submit {
                order,
                items,
                reason,
            } => orders::submit_refund(&mut session, order, &items, &reason).await?,
            RefundAction::List => orders::list_refunds(&session)?,
            RefundAction::Approve { id } => orders::resolve_refund(&mut session, id, true).await?,
            RefundAction::Reject { id } => orders::resolve_refund(&mut session, id, false).await?,
        },
    }
    Ok(())
}
