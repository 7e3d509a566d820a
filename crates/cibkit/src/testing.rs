//! In-memory stand-in for pcs, crm_diff, crm_simulate and crm_resource.
//!
//! The fake keeps a live CIB as a small resource model, renders it to
//! deterministic XML on export and parses offline files back on every
//! `pcs -f` call, so byte-identical round trips behave like the real tools.

use crate::error::Result;
use crate::runner::{CommandLine, CommandResult, Runner};
use crate::types::{Settings, ToolPaths};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FakeResource {
    pub agent: String,
    pub params: Vec<(String, String)>,
    pub bundle: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FakeCib {
    pub properties: BTreeMap<String, String>,
    pub resources: BTreeMap<String, FakeResource>,
    /// Document order of `resources`; recreated resources go last
    pub order: Vec<String>,
    /// Location rules as `(target, rule text)`
    pub constraints: BTreeSet<(String, String)>,
}

impl FakeCib {
    pub fn with_resource(mut self, name: &str, agent: &str, params: &[(&str, &str)]) -> Self {
        self.insert(
            name,
            FakeResource {
                agent: agent.to_string(),
                params: params
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                bundle: None,
            },
        );
        self
    }

    pub fn with_bundle_member(mut self, name: &str, agent: &str, bundle: &str) -> Self {
        self.insert(
            name,
            FakeResource {
                agent: agent.to_string(),
                params: Vec::new(),
                bundle: Some(bundle.to_string()),
            },
        );
        self
    }

    /// Add or replace a resource, appending new ids at the end.
    pub fn insert(&mut self, name: &str, resource: FakeResource) {
        if !self.order.iter().any(|id| id == name) {
            self.order.push(name.to_string());
        }
        self.resources.insert(name.to_string(), resource);
    }

    pub fn remove(&mut self, name: &str) -> Option<FakeResource> {
        self.order.retain(|id| id != name);
        self.resources.remove(name)
    }

    pub fn render(&self) -> String {
        let mut xml = String::from("<cib>\n  <configuration>\n    <crm_config>\n");
        for (name, value) in &self.properties {
            xml.push_str(&format!(
                "      <nvpair id=\"cib-bootstrap-options-{name}\" name=\"{name}\" value=\"{}\"/>\n",
                escape(value)
            ));
        }
        xml.push_str("    </crm_config>\n    <resources>\n");
        for (id, rsc) in self
            .order
            .iter()
            .filter_map(|id| self.resources.get(id).map(|r| (id, r)))
        {
            let mut primitive = format!("<primitive id=\"{id}\" type=\"{}\">", escape(&rsc.agent));
            primitive.push_str(&format!("<instance_attributes id=\"{id}-instance_attributes\">"));
            for (k, v) in &rsc.params {
                primitive.push_str(&format!(
                    "<nvpair id=\"{id}-instance_attributes-{k}\" name=\"{k}\" value=\"{}\"/>",
                    escape(v)
                ));
            }
            primitive.push_str("</instance_attributes></primitive>");
            match &rsc.bundle {
                Some(bundle) => xml.push_str(&format!(
                    "      <bundle id=\"{bundle}\">{primitive}</bundle>\n"
                )),
                None => xml.push_str(&format!("      {primitive}\n")),
            }
        }
        xml.push_str("    </resources>\n    <constraints>\n");
        for (target, rule) in &self.constraints {
            xml.push_str(&format!(
                "      <rsc_location id=\"location-{target}\" rsc=\"{target}\" rule=\"{}\"/>\n",
                escape(rule)
            ));
        }
        xml.push_str("    </constraints>\n  </configuration>\n</cib>\n");
        xml
    }

    pub fn parse(xml: &str) -> Self {
        let doc = roxmltree::Document::parse(xml).expect("fake cib must be valid xml");
        let mut cib = FakeCib::default();
        for node in doc.descendants().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "nvpair" if node.parent_element().map(|p| p.tag_name().name()) == Some("crm_config") => {
                    cib.properties.insert(
                        node.attribute("name").unwrap_or_default().to_string(),
                        node.attribute("value").unwrap_or_default().to_string(),
                    );
                }
                "primitive" => {
                    let bundle = node
                        .parent_element()
                        .filter(|p| p.has_tag_name("bundle"))
                        .and_then(|p| p.attribute("id"))
                        .map(str::to_string);
                    let params = node
                        .descendants()
                        .filter(|n| n.has_tag_name("nvpair"))
                        .map(|n| {
                            (
                                n.attribute("name").unwrap_or_default().to_string(),
                                n.attribute("value").unwrap_or_default().to_string(),
                            )
                        })
                        .collect();
                    cib.insert(
                        node.attribute("id").unwrap_or_default(),
                        FakeResource {
                            agent: node.attribute("type").unwrap_or_default().to_string(),
                            params,
                            bundle,
                        },
                    );
                }
                "rsc_location" => {
                    cib.constraints.insert((
                        node.attribute("rsc").unwrap_or_default().to_string(),
                        node.attribute("rule").unwrap_or_default().to_string(),
                    ));
                }
                _ => {}
            }
        }
        cib
    }

    /// Resources whose definition differs between `self` and `other`.
    pub fn changed_resources(&self, other: &FakeCib) -> Vec<String> {
        let ids: BTreeSet<&String> = self.resources.keys().chain(other.resources.keys()).collect();
        ids.into_iter()
            .filter(|id| self.resources.get(*id) != other.resources.get(*id))
            .cloned()
            .collect()
    }

    /// Resources present in both whose position in `<resources>` differs.
    pub fn moved_resources(&self, other: &FakeCib) -> Vec<String> {
        other
            .order
            .iter()
            .enumerate()
            .filter(|(n, id)| {
                self.order
                    .iter()
                    .position(|own| own == *id)
                    .is_some_and(|p| p != *n)
            })
            .map(|(_, id)| id.clone())
            .collect()
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub live: FakeCib,
    pub calls: Vec<CommandLine>,
    /// Number of upcoming `cib-push` calls to reject
    pub push_failures: u32,
    pub push_error: String,
    pub pushes: u32,
    pub supports_diff_against: bool,
    pub crm_diff_buggy: bool,
    /// Forced exit code for `crm_diff -o/-n`
    pub diff_code: Option<i32>,
    /// Forced exit code for `crm_simulate`
    pub simulate_code: Option<i32>,
    pub fail_backup: bool,
    /// Number of upcoming online `resource create` calls to fail
    pub create_failures: u32,
    pub verify_fails: bool,
    pub wait_code: i32,
    /// Replica count used when scheduling bundle members
    pub replicas: u32,
}

/// Shared handle so tests keep inspecting the fake after handing it over.
#[derive(Debug, Clone)]
pub(crate) struct FakeCluster {
    pub state: Rc<RefCell<FakeState>>,
}

impl FakeCluster {
    pub fn new(live: FakeCib) -> Self {
        let state = FakeState {
            live,
            push_error: "Error: unable to push cib\nCall cib_replace failed (-205): Update was older than existing configuration".to_string(),
            supports_diff_against: true,
            replicas: 2,
            ..Default::default()
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn live(&self) -> FakeCib {
        self.state.borrow().live.clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Vec<String>> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.program_name() == program)
            .map(CommandLine::arg_strings)
            .collect()
    }

    pub fn count_calls(&self, program: &str, first_args: &[&str]) -> usize {
        self.calls_to(program)
            .iter()
            .filter(|args| args.iter().zip(first_args).all(|(a, b)| a == b) && args.len() >= first_args.len())
            .count()
    }

    fn pcs(&self, args: &[String]) -> CommandResult {
        let mut state = self.state.borrow_mut();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["cluster", "cib", file] => {
                if state.fail_backup {
                    return CommandResult::failed(1, "Error: unable to get cib\n");
                }
                fs::write(file, state.live.render()).expect("write export");
                CommandResult::ok("")
            }
            ["cluster", "cib-push", "--help"] => {
                let mut help = String::from("Usage: pcs cluster cib-push <filename> [--wait[=<n>]]\n");
                if state.supports_diff_against {
                    help.push_str("    [diff-against=<filename_original> | scope=<object_type>]\n");
                }
                CommandResult::ok(help)
            }
            ["cluster", "cib-push", file, ..] => {
                state.pushes += 1;
                if state.push_failures > 0 {
                    state.push_failures -= 1;
                    return CommandResult::failed(1, state.push_error.clone());
                }
                let content = fs::read_to_string(file).expect("pushed file exists");
                state.live = FakeCib::parse(&content);
                CommandResult::ok("CIB updated\n")
            }
            ["-f", file, rest @ ..] => {
                let content = fs::read_to_string(file).expect("offline file exists");
                let mut cib = FakeCib::parse(&content);
                let result = apply(&mut cib, rest);
                if result.success() {
                    fs::write(file, cib.render()).expect("write offline");
                }
                result
            }
            ["resource", "show", name] => {
                if state.verify_fails || !state.live.resources.contains_key(*name) {
                    CommandResult::failed(1, format!("Error: unable to find resource '{name}'\n"))
                } else {
                    CommandResult::ok(format!(" Resource: {name}\n"))
                }
            }
            ["resource", "create", ..] => {
                if state.create_failures > 0 {
                    state.create_failures -= 1;
                    return CommandResult::failed(1, "Error: Unable to update cib\nCall cib_apply_diff failed\n");
                }
                apply(&mut state.live, &argv)
            }
            _ => CommandResult::failed(1, format!("Error: unknown command '{}'\n", args.join(" "))),
        }
    }

    fn crm_diff(&self, args: &[String]) -> CommandResult {
        let state = self.state.borrow();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["--cib", original, new] if original.starts_with("--original-string=") && new.starts_with("--new-string=") => {
                if state.crm_diff_buggy {
                    CommandResult {
                        stdout: "<diff format=\"2\"><change operation=\"modify\" path=\"/cib/configuration/resources/bundle[@id='galera-bundle']/storage/storage-mapping[@id='mysql-foo']\"/></diff>\n".to_string(),
                        stderr: String::new(),
                        code: Some(1),
                    }
                } else {
                    CommandResult::ok("")
                }
            }
            ["--cib", "-o", original, "-n", new] => {
                if let Some(code) = state.diff_code {
                    return CommandResult::failed(code, "crm_diff: could not parse input\n");
                }
                let original = FakeCib::parse(&fs::read_to_string(original).expect("orig exists"));
                let new = FakeCib::parse(&fs::read_to_string(new).expect("new exists"));
                let changed = original.changed_resources(&new);
                let moved = original.moved_resources(&new);
                if original == new {
                    return CommandResult::ok("");
                }
                let mut xml = String::from("<diff format=\"2\">\n  <version><source admin_epoch=\"0\" epoch=\"86\" num_updates=\"0\"/><target admin_epoch=\"0\" epoch=\"87\" num_updates=\"0\"/></version>\n");
                xml.push_str("  <change operation=\"modify\" path=\"/cib\"><change-list><change-attr name=\"epoch\" operation=\"set\" value=\"87\"/></change-list><change-result><cib epoch=\"87\"/></change-result></change>\n");
                for id in changed {
                    xml.push_str(&format!(
                        "  <change operation=\"modify\" path=\"/cib/configuration/resources/primitive[@id='{id}']/instance_attributes[@id='{id}-instance_attributes']\"><change-list/><change-result/></change>\n"
                    ));
                }
                for (position, id) in moved.iter().filter_map(|id| {
                    new.order.iter().position(|o| o == id).map(|p| (p, id))
                }) {
                    xml.push_str(&format!(
                        "  <change operation=\"move\" path=\"/cib/configuration/resources/primitive[@id='{id}']\" position=\"{position}\"/>\n"
                    ));
                }
                xml.push_str("</diff>\n");
                CommandResult {
                    stdout: xml,
                    stderr: String::new(),
                    code: Some(1),
                }
            }
            _ => CommandResult::failed(2, "crm_diff: invalid usage\n"),
        }
    }

    fn crm_simulate(&self, args: &[String]) -> CommandResult {
        let state = self.state.borrow();
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let ["-x", cib, "-s", "-G", graph] = argv.as_slice() else {
            return CommandResult::failed(64, "crm_simulate: invalid usage\n");
        };
        if let Some(code) = state.simulate_code {
            return CommandResult::failed(code, "crm_simulate: could not read input\n");
        }
        let candidate = FakeCib::parse(&fs::read_to_string(cib).expect("candidate exists"));
        let mut xml = String::from("<transition_graph cluster-delay=\"60s\" batch-limit=\"0\" transition_id=\"0\">\n");
        for (n, id) in state.live.changed_resources(&candidate).iter().enumerate() {
            let bundled = candidate
                .resources
                .get(id)
                .or_else(|| state.live.resources.get(id))
                .is_some_and(|r| r.bundle.is_some());
            let instances: Vec<String> = if bundled {
                (0..state.replicas).map(|i| format!("{id}-{i}")).collect()
            } else {
                vec![id.clone()]
            };
            for instance in instances {
                xml.push_str(&format!(
                    "  <synapse id=\"{n}\"><action_set><rsc_op id=\"{n}\" operation=\"stop\" on_node=\"node-1\"><primitive id=\"{instance}\" class=\"ocf\" provider=\"heartbeat\"/></rsc_op></action_set><inputs/></synapse>\n"
                ));
            }
        }
        xml.push_str("</transition_graph>\n");
        fs::write(graph, xml).expect("write graph");
        CommandResult::ok("Current cluster status:\n  * 1 node configured\n")
    }
}

/// Apply a pcs mutation (`resource delete/create`, `constraint location`,
/// `property set`) or read-only `resource show` to a parsed CIB.
fn apply(cib: &mut FakeCib, argv: &[&str]) -> CommandResult {
    match argv {
        ["resource", "delete", name] => {
            if cib.remove(name).is_none() {
                return CommandResult::failed(1, format!("Error: Resource '{name}' does not exist.\n"));
            }
            cib.constraints.retain(|(target, _)| target != name);
            CommandResult::ok(format!("Deleting Resource - {name}\n"))
        }
        ["resource", "create", name, agent, rest @ ..] => {
            if cib.resources.contains_key(*name) {
                return CommandResult::failed(1, format!("Error: '{name}' already exists\n"));
            }
            let mut params = Vec::new();
            let mut bundle = None;
            let mut iter = rest.iter();
            while let Some(token) = iter.next() {
                if *token == "bundle" {
                    bundle = iter.next().map(|b| (*b).to_string());
                } else if let Some((k, v)) = token.split_once('=') {
                    params.push((k.to_string(), v.to_string()));
                }
            }
            cib.insert(
                name,
                FakeResource {
                    agent: (*agent).to_string(),
                    params,
                    bundle,
                },
            );
            CommandResult::ok("")
        }
        ["resource", "show", name] => {
            if cib.resources.contains_key(*name) {
                CommandResult::ok(format!(" Resource: {name}\n"))
            } else {
                CommandResult::failed(1, format!("Error: unable to find resource '{name}'\n"))
            }
        }
        ["constraint", "location", target, "rule", rest @ ..] => {
            let force = rest.contains(&"--force");
            let rule: Vec<&str> = rest.iter().copied().filter(|t| *t != "--force").collect();
            let key = ((*target).to_string(), rule.join(" "));
            if cib.constraints.contains(&key) && !force {
                return CommandResult::failed(1, "Error: duplicate constraint already exists, use --force to override\n");
            }
            cib.constraints.insert(key);
            CommandResult::ok("")
        }
        ["property", "set", assignment] => match assignment.split_once('=') {
            Some((k, v)) => {
                cib.properties.insert(k.to_string(), v.to_string());
                CommandResult::ok("")
            }
            None => CommandResult::failed(1, "Error: missing value of property\n"),
        },
        ["property", "show"] => CommandResult::ok(
            cib.properties
                .iter()
                .map(|(k, v)| format!(" {k}: {v}\n"))
                .collect::<String>(),
        ),
        _ => CommandResult::failed(1, format!("Error: invalid command '{}'\n", argv.join(" "))),
    }
}

impl Runner for FakeCluster {
    fn run(&self, command: &CommandLine) -> Result<CommandResult> {
        self.state.borrow_mut().calls.push(command.clone());
        let args = command.arg_strings();
        let result = match command.program_name().as_str() {
            "pcs" => self.pcs(&args),
            "crm_diff" => self.crm_diff(&args),
            "crm_simulate" => self.crm_simulate(&args),
            "timeout" => {
                let code = self.state.borrow().wait_code;
                CommandResult::failed(code, "")
            }
            other => CommandResult::failed(127, format!("{other}: command not found\n")),
        };
        Ok(result)
    }
}

/// Settings pointing at `dir` for snapshots, with default tool names.
pub(crate) fn settings_in(dir: &Path) -> Settings {
    Settings {
        tools: ToolPaths::default(),
        snapshot_dir: PathBuf::from(dir),
        ..Default::default()
    }
}

/// Files left behind in a snapshot directory.
pub(crate) fn leftovers(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("snapshot dir readable")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect()
}
