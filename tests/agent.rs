//! End-to-end runs of the command pipeline through the worker, with a
//! scripted model, a recording desktop and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use jarvis_assistant::agent::Agent;
use jarvis_assistant::codegen;
use jarvis_assistant::config::Config;
use jarvis_assistant::desktop::RecordingDesktop;
use jarvis_assistant::llm::{LanguageModel, ScriptedModel};
use jarvis_assistant::memory::MemoryStore;
use jarvis_assistant::worker::{self, AgentHandle, Announcer};
use tempfile::TempDir;

struct Harness {
    handle: AgentHandle,
    desktop: Arc<RecordingDesktop>,
    model: Arc<ScriptedModel>,
    workspace: TempDir,
}

fn harness(answers: &[&str], env: &[(&str, &str)]) -> Harness {
    let workspace = tempfile::tempdir().unwrap();
    let env: Vec<(String, String)> = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let mut config = Config::from_lookup(|key| {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    });
    config.workspace = workspace.path().to_path_buf();

    let scratch = workspace.path().join("tmp");
    std::fs::create_dir(&scratch).unwrap();

    let desktop = Arc::new(RecordingDesktop::new());
    let model = Arc::new(ScriptedModel::new(answers.iter().copied()));
    let agent = Agent::new(config, desktop.clone())
        .with_model(Some(model.clone() as Arc<dyn LanguageModel>))
        .with_memory(Some(MemoryStore::in_memory().unwrap()))
        .with_announcer(Announcer::silent())
        .with_cleanup_sandbox(scratch)
        .without_delays();
    let (handle, _task) = worker::spawn(agent, 4);
    Harness {
        handle,
        desktop,
        model,
        workspace,
    }
}

#[tokio::test]
async fn remembers_what_the_user_says() {
    let h = harness(&["Muito prazer, Carlos."], &[]);
    let first = h.handle.ask("meu nome é Carlos").await.unwrap();
    assert_eq!(first.text, "Muito prazer, Carlos.");

    let facts = h.handle.ask("o que você sabe sobre mim").await.unwrap();
    assert!(facts.text.contains("Carlos"), "{}", facts.text);
    // Only the first command reached the model.
    assert_eq!(h.model.prompts().len(), 1);
}

#[tokio::test]
async fn generated_code_can_be_saved_afterwards() {
    let h = harness(&["```python\ndef fib(n):\n    return n\n```"], &[]);
    let pasted = h
        .handle
        .ask("escreva um código de fibonacci no bloco de notas")
        .await
        .unwrap();
    assert_eq!(pasted.text, "Código fibonacci gerado e colado no bloco de notas, mestre.");
    assert!(h.desktop.events().iter().any(|e| e == "hotkey ctrl+v"));

    let saved = h.handle.ask("sim").await.unwrap();
    assert_eq!(saved.text, "Código salvo com sucesso em 'fibonacci.py', mestre.");
    let code = std::fs::read_to_string(h.workspace.path().join("fibonacci.py")).unwrap();
    assert!(code.starts_with("def fib(n):"));
}

#[tokio::test]
async fn tips_survive_between_commands() {
    let h = harness(&[], &[]);
    let saved = h.handle.ask("salvar dica: rode cargo clippy antes do commit").await.unwrap();
    assert!(saved.text.starts_with("💾 Dica salva na memória"));

    let found = h.handle.ask("lembra daquela dica clippy").await.unwrap();
    assert!(found.text.contains("ENCONTRADOS 1 RESULTADOS"), "{}", found.text);
}

#[tokio::test]
async fn desktop_actions_respect_the_switch() {
    let h = harness(&[], &[("ENABLE_SYSTEM_ACTIONS", "false")]);
    let outcome = h.handle.ask("abra o discord").await.unwrap();
    assert_eq!(outcome.text, "Ações do sistema estão desativadas, mestre.");

    let outcome = h.handle.ask("protocolo de encerramento").await.unwrap();
    assert_eq!(outcome.text, "Ações do sistema estão desativadas, mestre.");
    assert!(!outcome.shutdown);
    assert!(!h.handle.is_shut_down());
    assert!(h.desktop.events().is_empty());
}

#[tokio::test]
async fn shutdown_protocol_stops_the_worker() {
    let h = harness(&[], &[]);
    let leftover = h.workspace.path().join("tmp").join("jarvis_leftover.txt");
    std::fs::write(&leftover, "x").unwrap();
    let mut stopped = h.handle.shutdown_signal();

    let outcome = h.handle.ask("protocolo de encerramento").await.unwrap();
    assert!(outcome.shutdown, "{}", outcome.text);
    tokio::time::timeout(Duration::from_secs(5), stopped.wait_for(|down| *down))
        .await
        .expect("shutdown signal")
        .unwrap();
    assert!(h.handle.is_shut_down());
    assert!(!leftover.exists());

    let report = std::fs::read_dir(h.workspace.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with("cleanup_report_"));
    assert!(report);
    assert!(h.handle.ask("que horas são").await.is_err());
}

#[tokio::test]
async fn project_request_builds_and_runs() {
    let python = codegen::language("python").unwrap();
    if !codegen::tools_available(python) {
        return;
    }
    let h = harness(&["```python\nprint(2 + 3)\n```"], &[]);
    let outcome = h
        .handle
        .ask("crie um programa em python para somar dois números")
        .await
        .unwrap();
    assert!(outcome.text.starts_with("✅ Projeto 'python_project_"), "{}", outcome.text);
    assert!(outcome.text.ends_with("Saída: 5"), "{}", outcome.text);

    let project = std::fs::read_dir(h.workspace.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .find(|e| e.file_name().to_string_lossy().starts_with("python_project_"))
        .expect("project directory");
    let code = std::fs::read_to_string(project.path().join("main.py")).unwrap();
    assert_eq!(code.trim(), "print(2 + 3)");
}

#[tokio::test]
async fn shutdown_refusal_keeps_running() {
    let h = harness(&[], &[]);
    let outcome = h.handle.ask("desligue o computador").await.unwrap();
    assert_eq!(outcome.text, "Comando de desligamento não permitido por segurança, mestre.");
    assert!(!outcome.shutdown);
    assert!(!h.handle.is_shut_down());
}
