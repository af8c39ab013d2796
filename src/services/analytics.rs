//! Read-only sales and dashboard reports.
//!
//! Only paid and shipped orders count as revenue. A product's line revenue is
//! credited in full to each of its categories.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{Category, Order, OrderStatus, Product};
use crate::domain::value_objects::Money;
use crate::error::Result;
use crate::store::Repositories;

pub const LOW_STOCK_THRESHOLD: u32 = 5;
const TOP_PRODUCTS: usize = 10;
const RECENT_ORDERS: usize = 5;
const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: String,
    pub revenue: Money,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRevenue {
    pub category_id: Option<Uuid>,
    pub category_name: String,
    pub revenue: Money,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSales {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub total_revenue: Money,
    pub total_orders: usize,
    pub average_order_value: Money,
    pub canceled_orders: usize,
    pub canceled_amount: Money,
    pub refunded_orders: usize,
    pub refunded_amount: Money,
    pub monthly_revenue: Vec<MonthlyRevenue>,
    pub category_breakdown: Vec<CategoryRevenue>,
    pub top_products: Vec<ProductSales>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockAlert {
    pub product_id: Uuid,
    pub name: String,
    pub stock_qty: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub orders_by_status: BTreeMap<&'static str, usize>,
    pub total_orders: usize,
    pub total_revenue: Money,
    pub total_customers: u64,
    pub total_products: usize,
    pub total_categories: usize,
    pub low_stock: Vec<StockAlert>,
    pub out_of_stock_count: usize,
    pub recent_orders: Vec<Order>,
}

pub fn sales_report(orders: &[Order], products: &[Product], categories: &[Category]) -> SalesReport {
    let products: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let category_names: HashMap<Uuid, &str> = categories.iter().map(|c| (c.id, c.name.as_str())).collect();

    let mut total_revenue = Money::ZERO;
    let mut total_orders = 0;
    let (mut canceled_orders, mut canceled_amount) = (0, Money::ZERO);
    let (mut refunded_orders, mut refunded_amount) = (0, Money::ZERO);
    let mut monthly: BTreeMap<String, (Money, usize)> = BTreeMap::new();
    let mut by_category: HashMap<Option<Uuid>, (Money, u32)> = HashMap::new();
    let mut by_product: HashMap<Uuid, ProductSales> = HashMap::new();

    for order in orders {
        match order.status {
            OrderStatus::Canceled => {
                canceled_orders += 1;
                canceled_amount = canceled_amount + order.total;
                continue;
            }
            OrderStatus::Refunded => {
                refunded_orders += 1;
                refunded_amount = refunded_amount + order.total;
                continue;
            }
            status if !status.is_settled() => continue,
            _ => {}
        }

        total_revenue = total_revenue + order.total;
        total_orders += 1;
        let month = monthly.entry(order.created_at.format("%Y-%m").to_string()).or_insert((Money::ZERO, 0));
        month.0 = month.0 + order.total;
        month.1 += 1;

        for item in &order.items {
            let line = item.line_total();
            let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
                product_id: item.product_id,
                name: item.name.clone(),
                quantity: 0,
                revenue: Money::ZERO,
            });
            entry.quantity = entry.quantity.saturating_add(item.qty);
            entry.revenue = entry.revenue + line;

            let categories = products.get(&item.product_id).map(|p| p.effective_categories()).unwrap_or_default();
            let keys: Vec<Option<Uuid>> = if categories.is_empty() { vec![None] } else { categories.into_iter().map(Some).collect() };
            for key in keys {
                let slot = by_category.entry(key).or_insert((Money::ZERO, 0));
                slot.0 = slot.0 + line;
                slot.1 = slot.1.saturating_add(item.qty);
            }
        }
    }

    let mut category_breakdown: Vec<CategoryRevenue> = by_category
        .into_iter()
        .map(|(id, (revenue, quantity))| CategoryRevenue {
            category_id: id,
            category_name: id.and_then(|id| category_names.get(&id).copied()).unwrap_or(UNCATEGORIZED).to_string(),
            revenue: revenue.round(),
            quantity,
        })
        .collect();
    category_breakdown.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.category_name.cmp(&b.category_name)));

    let mut top_products: Vec<ProductSales> = by_product.into_values().collect();
    top_products.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    top_products.truncate(TOP_PRODUCTS);
    for p in &mut top_products { p.revenue = p.revenue.round(); }

    let average_order_value = if total_orders == 0 {
        Money::ZERO
    } else {
        Money::new(total_revenue.amount() / rust_decimal::Decimal::from(total_orders)).round()
    };

    SalesReport {
        total_revenue: total_revenue.round(),
        total_orders,
        average_order_value,
        canceled_orders,
        canceled_amount: canceled_amount.round(),
        refunded_orders,
        refunded_amount: refunded_amount.round(),
        monthly_revenue: monthly
            .into_iter()
            .map(|(month, (revenue, orders))| MonthlyRevenue { month, revenue: revenue.round(), orders })
            .collect(),
        category_breakdown,
        top_products,
    }
}

pub fn dashboard(orders: &[Order], products: &[Product], total_categories: usize, total_customers: u64) -> Dashboard {
    let mut orders_by_status: BTreeMap<&'static str, usize> = OrderStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for order in orders {
        *orders_by_status.entry(order.status.as_str()).or_default() += 1;
    }

    let total_revenue = orders.iter().filter(|o| o.status.is_settled()).map(|o| o.total).sum::<Money>().round();

    let mut low_stock: Vec<StockAlert> = products
        .iter()
        .filter(|p| p.stock_qty <= LOW_STOCK_THRESHOLD)
        .map(|p| StockAlert { product_id: p.id, name: p.name.clone(), stock_qty: p.stock_qty })
        .collect();
    low_stock.sort_by(|a, b| a.stock_qty.cmp(&b.stock_qty).then_with(|| a.name.cmp(&b.name)));

    let mut recent_orders = orders.to_vec();
    recent_orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent_orders.truncate(RECENT_ORDERS);

    Dashboard {
        orders_by_status,
        total_orders: orders.len(),
        total_revenue,
        total_customers,
        total_products: products.len(),
        total_categories,
        out_of_stock_count: products.iter().filter(|p| p.stock_qty == 0).count(),
        low_stock,
        recent_orders,
    }
}

#[derive(Clone)]
pub struct AnalyticsService {
    repos: Repositories,
}

impl AnalyticsService {
    pub fn new(repos: Repositories) -> Self { Self { repos } }

    pub async fn sales(&self) -> Result<SalesReport> {
        let orders = self.repos.orders.list_orders().await?;
        let products = self.repos.products.list_products().await?;
        let categories = self.repos.categories.list_categories().await?;
        Ok(sales_report(&orders, &products, &categories))
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        let orders = self.repos.orders.list_orders().await?;
        let products = self.repos.products.list_products().await?;
        let categories = self.repos.categories.list_categories().await?;
        let customers = self.repos.customers.count_customers().await?;
        Ok(dashboard(&orders, &products, categories.len(), customers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, ShippingSnapshot};
    use crate::domain::discounts;
    use crate::domain::value_objects::PublicCode;
    use chrono::{TimeZone, Utc};

    fn order(product: &Product, qty: u32, status: OrderStatus, month: u32) -> Order {
        let items = vec![OrderItem { product_id: product.id, name: product.name.clone(), price: product.price, qty, image_url: None }];
        let pricing = discounts::compose(product.price.multiply(qty), None, &[]);
        let mut order = Order::place(PublicCode::random_lower(), Uuid::now_v7(), items, &pricing, ShippingSnapshot::default(), None, vec![]);
        order.status = status;
        order.created_at = Utc.with_ymd_and_hms(2024, month, 15, 12, 0, 0).unwrap();
        order
    }

    #[test]
    fn test_only_settled_orders_count_as_revenue() {
        let fruit = Category::create("Fruit", None, None);
        let mut mango = Product::create("Mango", Money::from_cents(1000), 10);
        mango.assign_categories(vec![fruit.id]);
        let gum = Product::create("Gum", Money::from_cents(200), 3);

        let orders = vec![
            order(&mango, 2, OrderStatus::Paid, 1),
            order(&mango, 1, OrderStatus::Shipped, 2),
            order(&gum, 5, OrderStatus::Paid, 2),
            order(&mango, 4, OrderStatus::Pending, 2),
            order(&mango, 3, OrderStatus::Canceled, 2),
            order(&gum, 1, OrderStatus::Refunded, 3),
        ];
        let report = sales_report(&orders, &[mango.clone(), gum.clone()], &[fruit.clone()]);

        assert_eq!(report.total_revenue, Money::from_cents(4000));
        assert_eq!(report.total_orders, 3);
        assert_eq!(report.canceled_orders, 1);
        assert_eq!(report.canceled_amount, Money::from_cents(3000));
        assert_eq!(report.refunded_amount, Money::from_cents(200));
        assert_eq!(report.monthly_revenue.iter().map(|m| m.month.as_str()).collect::<Vec<_>>(), vec!["2024-01", "2024-02"]);
        assert_eq!(report.monthly_revenue[1].revenue, Money::from_cents(2000));

        assert_eq!(report.category_breakdown[0].category_name, "Fruit");
        assert_eq!(report.category_breakdown[0].revenue, Money::from_cents(3000));
        assert_eq!(report.category_breakdown[1].category_name, "Uncategorized");
        assert_eq!(report.top_products[0].name, "Mango");
        assert_eq!(report.top_products[0].quantity, 3);
    }

    #[test]
    fn test_quantities_saturate_instead_of_overflowing() {
        let bulk = Product::create("Bulk", Money::from_cents(1), u32::MAX);
        let orders = vec![
            order(&bulk, u32::MAX, OrderStatus::Paid, 1),
            order(&bulk, 10, OrderStatus::Shipped, 1),
        ];
        let report = sales_report(&orders, &[bulk], &[]);
        assert_eq!(report.top_products[0].quantity, u32::MAX);
        assert_eq!(report.category_breakdown[0].quantity, u32::MAX);
        assert_eq!(report.total_orders, 2);
    }

    #[test]
    fn test_legacy_category_is_used_when_list_is_empty() {
        let legacy = Category::create("Energy", None, None);
        let mut can = Product::create("Can", Money::from_cents(300), 10);
        can.category_id = Some(legacy.id);
        let report = sales_report(&[order(&can, 1, OrderStatus::Paid, 5)], &[can], &[legacy]);
        assert_eq!(report.category_breakdown.len(), 1);
        assert_eq!(report.category_breakdown[0].category_name, "Energy");
    }

    #[test]
    fn test_dashboard_counts_and_alerts() {
        let low = Product::create("Low", Money::from_cents(100), 5);
        let out = Product::create("Out", Money::from_cents(100), 0);
        let plenty = Product::create("Plenty", Money::from_cents(100), 50);
        let orders: Vec<Order> = (1..=7).map(|m| order(&plenty, 1, OrderStatus::Paid, m)).collect();

        let board = dashboard(&orders, &[low, out, plenty], 6, 2);
        assert_eq!(board.orders_by_status["paid"], 7);
        assert_eq!(board.orders_by_status["pending"], 0);
        assert_eq!(board.total_revenue, Money::from_cents(700));
        assert_eq!(board.low_stock.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["Out", "Low"]);
        assert_eq!(board.out_of_stock_count, 1);
        assert_eq!(board.recent_orders.len(), 5);
        assert_eq!(board.recent_orders[0].created_at.format("%m").to_string(), "07");
    }
}
