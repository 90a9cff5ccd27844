use clap::Parser;
use fukusei::model::{
    Condition, DataTable, Formula, Id, Node, NumberBinding, ResolvedMarker, SelectBinding,
    SourceKind, SourceRef, Variable,
};
use fukusei::store::StoreSnapshot;
use rand::{Rng, rngs::ThreadRng};

/// A CLI tool to generate random form trees for the Fukusei duplicator
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The path to write the generated snapshot to (`.bin` for bincode, otherwise JSON)
    #[arg(short, long, default_value = "generated_form.json")]
    output: String,

    /// Number of top-level sections
    #[arg(long, default_value_t = 3)]
    sections: usize,

    /// Maximum depth below each section
    #[arg(long, default_value_t = 3)]
    depth: usize,

    /// Maximum number of children per node
    #[arg(long, default_value_t = 4)]
    fanout: usize,

    /// Number of shared lookup tables outside every section
    #[arg(long, default_value_t = 2)]
    shared_tables: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut rng = rand::rng();

    if cli.fanout == 0 {
        eprintln!("Error: --fanout must be at least 1");
        std::process::exit(1);
    }

    println!(
        "Generating {} section(s), depth up to {}, fan-out up to {}...",
        cli.sections, cli.depth, cli.fanout
    );

    let mut generator = Generator::new(&mut rng);
    generator.shared_lookups(cli.shared_tables);
    for order in 0..cli.sections {
        let root = generator.node(None, order as i32);
        generator.subtree(&root, cli.depth, cli.fanout);
    }
    let snapshot = generator.finish();

    if cli.output.ends_with(".bin") {
        snapshot.save_binary(&cli.output)?;
    } else {
        snapshot.save_json(&cli.output)?;
    }

    println!(
        "Successfully generated {} records ({} nodes) and saved them to '{}'",
        snapshot.record_count(),
        snapshot.nodes.len(),
        cli.output
    );

    Ok(())
}

struct Generator<'r> {
    rng: &'r mut ThreadRng,
    snapshot: StoreSnapshot,
    next: usize,
    shared: Vec<Id>,
    globals: Option<Id>,
}

impl<'r> Generator<'r> {
    fn new(rng: &'r mut ThreadRng) -> Self {
        Self {
            rng,
            snapshot: StoreSnapshot::default(),
            next: 0,
            shared: Vec::new(),
            globals: None,
        }
    }

    /// Identities use `_` so they never look like derived `-<n>` clones.
    fn fresh(&mut self, prefix: &str) -> Id {
        self.next += 1;
        Id::from(format!("{}_{:05}", prefix, self.next))
    }

    fn marker(&mut self) -> Option<ResolvedMarker> {
        self.rng.random_bool(0.7).then(|| ResolvedMarker {
            resolved_at: self.rng.random_range(1_600_000_000..1_800_000_000),
            value: Some(format!("{:.2}", self.rng.random_range(0.0..1000.0))),
        })
    }

    fn shared_lookups(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let globals = self.node(None, 1000);
        for _ in 0..count {
            let table = self.table(&globals);
            self.shared.push(table);
        }
        self.globals = Some(globals);
        println!("-> Generated {} shared lookup table(s).", count);
    }

    fn subtree(&mut self, parent: &Id, depth: usize, fanout: usize) {
        self.descriptors(parent);
        if depth == 0 {
            return;
        }
        let children = self.rng.random_range(0..=fanout);
        for order in 0..children {
            let child = self.node(Some(parent), order as i32);
            self.subtree(&child, depth - 1, fanout);
        }
    }

    fn node(&mut self, parent: Option<&Id>, order: i32) -> Id {
        let id = self.fresh("node");
        self.snapshot.nodes.push(Node {
            id: id.clone(),
            parent_id: parent.cloned(),
            order,
            label: format!("Field {}", self.next),
            field_type: Some(
                ["text", "number", "select", "section"][self.rng.random_range(0..4)].to_string(),
            ),
            has_formula: false,
            has_condition: false,
            has_table: false,
            has_data: false,
            linked_formula_ids: Vec::new(),
            linked_condition_ids: Vec::new(),
            linked_table_ids: Vec::new(),
            linked_variable_ids: Vec::new(),
            active_table_id: None,
            shared_reference_ids: Vec::new(),
            copied_from_node_id: None,
            copy_suffix: None,
        });
        id
    }

    /// Attaches a random set of descriptors to `owner` and links them on the node.
    fn descriptors(&mut self, owner: &Id) {
        let mut variables = Vec::new();
        let mut formulas = Vec::new();
        let mut conditions = Vec::new();
        let mut tables = Vec::new();

        if self.rng.random_bool(0.4) {
            tables.push(self.table(owner));
        }
        for _ in 0..self.rng.random_range(0..3) {
            let source = if let Some(table) = tables.first().filter(|_| self.rng.random_bool(0.5)) {
                SourceRef::tagged(SourceKind::Table, table.clone())
            } else {
                SourceRef::Bare(owner.clone())
            };
            variables.push(self.variable(owner, source));
        }
        if !variables.is_empty() && self.rng.random_bool(0.6) {
            formulas.push(self.formula(owner, &variables));
        }
        if !variables.is_empty() && self.rng.random_bool(0.3) {
            conditions.push(self.condition(owner, &variables));
        }
        if let Some(formula) = formulas.first() {
            if self.rng.random_bool(0.5) {
                let id = self.fresh("var");
                let marker = self.marker();
                self.snapshot.variables.push(Variable {
                    id: id.clone(),
                    owner_node_id: owner.clone(),
                    display_name: format!("Result {}", self.next),
                    unit: None,
                    precision: Some(2),
                    source_ref: Some(SourceRef::tagged(SourceKind::Formula, formula.clone())),
                    last_resolved: marker,
                });
                variables.push(id);
            }
        }

        let lookup = tables.first().cloned().or_else(|| self.pick_shared());
        if let Some(table) = lookup.filter(|_| self.rng.random_bool(0.5)) {
            let id = self.fresh("select");
            self.snapshot.select_bindings.push(SelectBinding {
                id,
                owner_node_id: owner.clone(),
                table_reference: Some(table),
                key_column: Some("key".to_string()),
                display_column: Some("label".to_string()),
                multiple: self.rng.random_bool(0.2),
            });
        } else if self.rng.random_bool(0.3) {
            let id = self.fresh("number");
            self.snapshot.number_bindings.push(NumberBinding {
                id,
                owner_node_id: owner.clone(),
                min: Some(0.0),
                max: Some(self.rng.random_range(10.0..10_000.0)),
                step: Some(0.1),
                decimals: Some(self.rng.random_range(0..4)),
                unit: Some("mm".to_string()),
            });
        }

        let shared = self.pick_shared().filter(|_| self.rng.random_bool(0.3));
        let globals = self.globals.clone().filter(|_| self.rng.random_bool(0.2));
        if let Some(node) = self.snapshot.nodes.iter_mut().find(|n| &n.id == owner) {
            node.has_formula = !formulas.is_empty();
            node.has_condition = !conditions.is_empty();
            node.has_table = !tables.is_empty();
            node.has_data = !variables.is_empty();
            node.active_table_id = tables.first().cloned().or(shared.clone());
            node.linked_table_ids = tables.into_iter().chain(shared).collect();
            node.linked_variable_ids = variables;
            node.linked_formula_ids = formulas;
            node.linked_condition_ids = conditions;
            node.shared_reference_ids = globals.into_iter().collect();
        }
    }

    fn pick_shared(&mut self) -> Option<Id> {
        if self.shared.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.shared.len());
        Some(self.shared[index].clone())
    }

    fn variable(&mut self, owner: &Id, source: SourceRef) -> Id {
        let id = self.fresh("var");
        let marker = self.marker();
        self.snapshot.variables.push(Variable {
            id: id.clone(),
            owner_node_id: owner.clone(),
            display_name: format!("Value {}", self.next),
            unit: Some(["mm", "kg", "%", "EUR"][self.rng.random_range(0..4)].to_string()),
            precision: Some(self.rng.random_range(0..4)),
            source_ref: Some(source),
            last_resolved: marker,
        });
        id
    }

    fn formula(&mut self, owner: &Id, variables: &[Id]) -> Id {
        let id = self.fresh("formula");
        let mut tokens = Vec::new();
        for (i, variable) in variables.iter().enumerate() {
            if i > 0 {
                tokens.push(["+", "-", "*", "/"][self.rng.random_range(0..4)].to_string());
            }
            tokens.push(format!("@value.{}", variable));
        }
        if let Some(table) = self.pick_shared().filter(|_| self.rng.random_bool(0.3)) {
            tokens.push("+".to_string());
            tokens.push(format!("@table.{}", table));
        }
        let marker = self.marker();
        self.snapshot.formulas.push(Formula {
            id: id.clone(),
            owner_node_id: owner.clone(),
            name: format!("Formula {}", self.next),
            tokens,
            linked_variable_ids: variables.to_vec(),
            last_resolved: marker,
        });
        id
    }

    fn condition(&mut self, owner: &Id, variables: &[Id]) -> Id {
        let id = self.fresh("condition");
        let threshold = self.rng.random_range(0..100);
        let condition_set = format!(
            r#"{{"when":"@value.{} > {}","then":"show","else":"hide"}}"#,
            variables[0], threshold
        );
        let marker = self.marker();
        self.snapshot.conditions.push(Condition {
            id: id.clone(),
            owner_node_id: owner.clone(),
            name: format!("Condition {}", self.next),
            condition_set,
            linked_variable_ids: vec![variables[0].clone()],
            last_resolved: marker,
        });
        id
    }

    fn table(&mut self, owner: &Id) -> Id {
        let id = self.fresh("table");
        let rows = (0..self.rng.random_range(1..6))
            .map(|i| vec![format!("k{}", i), format!("Option {}", i)])
            .collect();
        let marker = self.marker();
        self.snapshot.tables.push(DataTable {
            id: id.clone(),
            owner_node_id: owner.clone(),
            name: format!("Lookup {}", self.next),
            columns: vec!["key".to_string(), "label".to_string()],
            rows,
            last_resolved: marker,
        });
        id
    }

    fn finish(self) -> StoreSnapshot {
        self.snapshot
    }
}
