use comfy_table::{Cell, Table};

use pocketledger::models::{CategoryKind, NewCategory};

use super::open_ledger;

pub fn add(name: &str, kind: CategoryKind, color: &str) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    let id = ledger.create_category(&NewCategory {
        name: name.to_string(),
        kind,
        color: color.to_string(),
    })?;
    println!("Added {kind} category {id}: {}", name.trim());
    Ok(())
}

pub fn list(kind: Option<CategoryKind>) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    let categories = ledger.categories(kind)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Kind", "Color", "Default"]);
    for category in &categories {
        table.add_row(vec![
            Cell::new(category.id),
            Cell::new(&category.name),
            Cell::new(category.kind),
            Cell::new(&category.color),
            Cell::new(if category.is_default { "yes" } else { "" }),
        ]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> anyhow::Result<()> {
    let (_, ledger) = open_ledger()?;
    let name = ledger.category(id)?.name;
    ledger.delete_category(id)?;
    println!("Deleted category {id}: {name}");
    Ok(())
}
