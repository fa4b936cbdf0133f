//! Multi-language project generator.
//!
//! Turns "crie um programa em rust para ..." into a project directory in the
//! workspace containing a single main file, then compiles and runs it. The
//! generate/run/fix loop on top of this lives in [`crate::debugger`].

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use crate::llm::LanguageModel;
use crate::process;
use crate::router::contains_word;

/// Limit for each compile or run step.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// How to build and run one language.
#[derive(Debug)]
pub struct LanguageSpec {
    pub name: &'static str,
    pub main_file: &'static str,
    pub compiler: Option<&'static str>,
    pub interpreter: Option<&'static str>,
    pub build_dir: Option<&'static str>,
    template: &'static str,
    /// Line prefixes that mark where code starts in a chatty model answer.
    pub(crate) code_starts: &'static [&'static str],
}

pub static LANGUAGES: &[LanguageSpec] = &[
    LanguageSpec {
        name: "python",
        main_file: "main.py",
        compiler: None,
        interpreter: Some(PYTHON),
        build_dir: None,
        template: "#!/usr/bin/env python3\n\"\"\"\n{description}\n\"\"\"\n\n\ndef main():\n    \"\"\"Função principal\"\"\"\n    print(\"Executando programa em Python...\")\n    # Implemente a lógica aqui\n\n\nif __name__ == \"__main__\":\n    main()\n",
        code_starts: &["#!/usr/bin/env python3", "import ", "from ", "def "],
    },
    LanguageSpec {
        name: "cpp",
        main_file: "main.cpp",
        compiler: Some("g++"),
        interpreter: None,
        build_dir: Some("build"),
        template: "#include <iostream>\n#include <string>\n\n/*\n * {description}\n */\n\nint main() {\n    std::cout << \"Executando programa em C++...\" << std::endl;\n    // Implemente a lógica aqui\n    return 0;\n}\n",
        code_starts: &["#include", "using namespace", "int main("],
    },
    LanguageSpec {
        name: "javascript",
        main_file: "index.js",
        compiler: None,
        interpreter: Some("node"),
        build_dir: None,
        template: "/**\n * {description}\n */\n\nconsole.log(\"Executando programa em JavaScript...\");\n// Implemente a lógica aqui\n",
        code_starts: &["//", "/*", "const ", "let ", "var ", "function ", "console."],
    },
    LanguageSpec {
        name: "java",
        main_file: "Main.java",
        compiler: Some("javac"),
        interpreter: Some("java"),
        build_dir: None,
        template: "/**\n * {description}\n */\npublic class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Executando programa em Java...\");\n        // Implemente a lógica aqui\n    }\n}\n",
        code_starts: &["import ", "public class", "public static void main"],
    },
    LanguageSpec {
        name: "rust",
        main_file: "main.rs",
        compiler: Some("rustc"),
        interpreter: None,
        build_dir: None,
        template: "/*\n * {description}\n */\n\nfn main() {\n    println!(\"Executando programa em Rust...\");\n    // Implemente a lógica aqui\n}\n",
        code_starts: &["use ", "fn main(", "fn "],
    },
    LanguageSpec {
        name: "go",
        main_file: "main.go",
        compiler: None,
        interpreter: Some("go"),
        build_dir: None,
        template: "package main\n\nimport \"fmt\"\n\n/*\n * {description}\n */\n\nfunc main() {\n    fmt.Println(\"Executando programa em Go...\")\n    // Implemente a lógica aqui\n}\n",
        code_starts: &["package main", "import ", "func main("],
    },
    LanguageSpec {
        name: "c",
        main_file: "main.c",
        compiler: Some("gcc"),
        interpreter: None,
        build_dir: None,
        template: "#include <stdio.h>\n#include <stdlib.h>\n\n/*\n * {description}\n */\n\nint main() {\n    printf(\"Executando programa em C...\\n\");\n    // Implemente a lógica aqui\n    return 0;\n}\n",
        code_starts: &["#include", "int main("],
    },
    LanguageSpec {
        name: "cs",
        main_file: "Program.cs",
        compiler: Some("dotnet"),
        interpreter: Some("dotnet"),
        build_dir: None,
        template: "using System;\n\n/*\n * {description}\n */\n\nclass Program {\n    static void Main(string[] args) {\n        Console.WriteLine(\"Executando programa em C#...\");\n        // Implemente a lógica aqui\n    }\n}\n",
        code_starts: &["using ", "namespace ", "class ", "static void Main"],
    },
];

#[cfg(target_os = "windows")]
const PYTHON: &str = "python";
#[cfg(not(target_os = "windows"))]
const PYTHON: &str = "python3";

/// Minimal project file so `dotnet build` has something to build.
const CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
    <Nullable>enable</Nullable>
  </PropertyGroup>
</Project>
"#;

pub fn language(name: &str) -> Option<&'static LanguageSpec> {
    LANGUAGES.iter().find(|l| l.name == name)
}

pub fn language_names() -> String {
    LANGUAGES.iter().map(|l| l.name).collect::<Vec<_>>().join(", ")
}

/// A request to create and run a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRequest {
    /// Normalised language name; may be unsupported.
    pub language: String,
    pub task: String,
}

pub fn normalize_language(name: &str) -> String {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "c++" | "c plus plus" => "cpp",
        "js" | "nodejs" | "node" => "javascript",
        "c#" | "csharp" | "c sharp" => "cs",
        "golang" => "go",
        "py" => "python",
        other => other,
    }
    .to_string()
}

/// Guess the language from keywords; python when nothing is mentioned.
pub fn detect_language(command: &str) -> &'static str {
    const KEYWORDS: &[(&str, &[&str])] = &[
        ("python", &["python", ".py"]),
        ("cpp", &["c++", "cpp", ".cpp", "c plus plus"]),
        ("javascript", &["javascript", "js", "node", "nodejs", ".js"]),
        ("java", &["java", ".java"]),
        ("rust", &["rust", ".rs"]),
        ("go", &["golang", "go", ".go"]),
        ("cs", &["c#", "csharp", "c sharp", ".cs"]),
        ("c", &["linguagem c", ".c"]),
    ];
    let lower = command.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_word(&lower, w)))
        .map(|(lang, _)| *lang)
        .unwrap_or("python")
}

/// Recognise "crie|gere|faça|escreva um script|programa|código [em <lang>]
/// para <tarefa>".
pub fn interpret_request(command: &str) -> Option<ProjectRequest> {
    static RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?i)\b(?:crie|gere|faça|faca|escreva) um (?:script|programa|código|codigo)(?: em (c\+\+|c#|c sharp|[\w.]+))? para\b",
        )
        .expect("valid regex")
    });
    static ARTICLE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^(?:que|o|a|os|as)\s+").expect("valid regex"));

    let caps = RE.captures(command)?;
    let language = match caps.get(1) {
        Some(lang) => normalize_language(lang.as_str()),
        None => detect_language(command).to_string(),
    };
    let rest = caps.get(0).map_or("", |m| &command[m.end()..]);
    let task = ARTICLE.replace(rest.trim(), "");
    let task = task.trim().trim_end_matches(|c: char| c == '.' || c == '!').to_string();
    Some(ProjectRequest {
        language,
        task: if task.is_empty() {
            "um programa simples".to_string()
        } else {
            task
        },
    })
}

/// True when the program can be spawned at all.
pub fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// Compiler and interpreter (whichever the language needs) are installed.
pub fn tools_available(spec: &LanguageSpec) -> bool {
    spec.compiler.map_or(true, tool_available) && spec.interpreter.map_or(true, tool_available)
}

pub fn template_code(spec: &LanguageSpec, task: &str) -> String {
    spec.template
        .replace("{description}", &format!("Código gerado para: {task}"))
}

fn generation_prompt(spec: &LanguageSpec, task: &str) -> String {
    let lang = spec.name.to_uppercase();
    format!(
        "Você é um programador especialista em {lang}. Gere um código completo e funcional para a seguinte tarefa:\n\n\
LINGUAGEM: {lang}\n\
TAREFA: {task}\n\n\
REQUISITOS:\n\
1. Código {lang} completo e funcional\n\
2. Comente o código de forma clara e concisa\n\
3. Inclua tratamento de erros básico se apropriado\n\
4. Se necessário, inclua imports/includes no início\n\
5. O código deve ser executável diretamente, sem entrada do usuário\n\
6. Use o arquivo principal: {main}\n\n\
IMPORTANTE:\n\
- Retorne APENAS o código, sem explicações adicionais\n\
- Não inclua marcadores como ```\n\
- Para linguagens compiladas, inclua uma função main() adequada",
        main = spec.main_file
    )
}

/// Ask the model for code; falls back to the language template.
pub async fn generate_code(
    model: Option<&dyn LanguageModel>,
    spec: &LanguageSpec,
    task: &str,
) -> String {
    let Some(model) = model else {
        return template_code(spec, task);
    };
    match model.generate(&generation_prompt(spec, task)).await {
        Ok(answer) => {
            let code = clean_code(&answer, spec.code_starts);
            if code.trim().is_empty() {
                template_code(spec, task)
            } else {
                code
            }
        }
        Err(e) => {
            log::warn!("Code generation failed, using template: {e}");
            template_code(spec, task)
        }
    }
}

/// Strip fences and any prose before the first line that looks like code.
pub fn clean_code(answer: &str, code_starts: &[&str]) -> String {
    static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*```[\w+#-]*\s*$").expect("valid regex"));
    let without_fences = FENCE.replace_all(answer, "");
    let lines: Vec<&str> = without_fences.lines().collect();
    let start = lines
        .iter()
        .position(|l| code_starts.iter().any(|p| l.trim_start().starts_with(p)));
    match start {
        Some(i) => lines[i..].join("\n").trim_end().to_string() + "\n",
        None => without_fences.trim().to_string(),
    }
}

/// Creates project directories with unique names.
pub struct ProjectGenerator {
    workspace: PathBuf,
    counter: u32,
}

impl ProjectGenerator {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            counter: 0,
        }
    }

    pub fn set_workspace(&mut self, workspace: impl Into<PathBuf>) {
        self.workspace = workspace.into();
    }

    pub fn project_name(&mut self, spec: &LanguageSpec, task: &str) -> String {
        static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
        static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
        let clean = NON_WORD.replace_all(task.trim(), "");
        let clean = SPACES.replace_all(&clean, "_");
        let clean: String = clean.chars().take(20).collect();
        self.counter += 1;
        format!(
            "{}_project_{}_{}_{}",
            spec.name,
            clean,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.counter
        )
    }

    /// Create the project directory with its main file. Returns the path
    /// and the project name.
    pub fn create(&mut self, spec: &LanguageSpec, code: &str, task: &str) -> Result<(PathBuf, String)> {
        let name = self.project_name(spec, task);
        let path = self.workspace.join(&name);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create project directory {}", path.display()))?;
        if let Some(build) = spec.build_dir {
            fs::create_dir_all(path.join(build)).context("failed to create build directory")?;
        }
        if spec.name == "cs" {
            fs::write(path.join("Program.csproj"), CSPROJ).context("failed to write csproj")?;
        }
        write_main(&path, spec, code)?;
        Ok((path, name))
    }
}

pub fn write_main(project: &Path, spec: &LanguageSpec, code: &str) -> Result<()> {
    let file = project.join(spec.main_file);
    fs::write(&file, code).with_context(|| format!("failed to write {}", file.display()))
}

/// Outcome of compiling and running a project.
#[derive(Debug, Clone, Default)]
pub struct RunResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub compile_error: bool,
}

impl RunResult {
    fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Error text used for analysis: stderr, or stdout when stderr is empty.
    pub fn error_output(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

struct Step {
    program: String,
    args: Vec<String>,
}

impl Step {
    fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

fn executable(project: &Path, spec: &LanguageSpec) -> PathBuf {
    let name = format!("program_{}{}", spec.name, std::env::consts::EXE_SUFFIX);
    match spec.build_dir {
        Some(dir) => project.join(dir).join(name),
        None => project.join(name),
    }
}

/// Compile step (if any) and run step for a language.
fn steps(project: &Path, spec: &LanguageSpec) -> (Option<Step>, Step) {
    let exe = executable(project, spec);
    let exe_str = exe.to_string_lossy().to_string();
    match spec.name {
        "cpp" => (
            Some(Step::new("g++", &["-std=c++17", "-o", exe_str.as_str(), spec.main_file])),
            Step::new(exe_str.clone(), &[]),
        ),
        "c" => (
            Some(Step::new("gcc", &["-o", exe_str.as_str(), spec.main_file])),
            Step::new(exe_str.clone(), &[]),
        ),
        "rust" => (
            Some(Step::new("rustc", &["-o", exe_str.as_str(), spec.main_file])),
            Step::new(exe_str.clone(), &[]),
        ),
        "java" => (
            Some(Step::new("javac", &[spec.main_file])),
            Step::new("java", &["-cp", ".", "Main"]),
        ),
        "cs" => (
            Some(Step::new("dotnet", &["build", "--nologo"])),
            Step::new("dotnet", &["run", "--no-build"]),
        ),
        "go" => (None, Step::new("go", &["run", spec.main_file])),
        "javascript" => (None, Step::new("node", &[spec.main_file])),
        _ => (None, Step::new(PYTHON, &[spec.main_file])),
    }
}

fn run_step(project: &Path, step: &Step) -> RunResult {
    log::info!("Running: {} {}", step.program, step.args.join(" "));
    let mut child = match Command::new(&step.program)
        .args(&step.args)
        .current_dir(project)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return RunResult::failed(format!("Erro na execução: {e}")),
    };

    match process::wait_captured(&mut child, STEP_TIMEOUT) {
        Ok(Some(captured)) => RunResult {
            success: captured.status.success(),
            stdout: captured.stdout,
            stderr: captured.stderr,
            exit_code: captured.status.code(),
            compile_error: false,
        },
        Ok(None) => RunResult::failed(format!(
            "Timeout de execução ({}s)",
            STEP_TIMEOUT.as_secs()
        )),
        Err(e) => RunResult::failed(format!("Erro na execução: {e}")),
    }
}

/// Compile (when needed) and run the project. Blocking; call from
/// `spawn_blocking`.
pub fn compile_and_run(project: &Path, spec: &LanguageSpec) -> RunResult {
    let (compile, run) = steps(project, spec);
    if let Some(compile) = compile {
        let result = run_step(project, &compile);
        if !result.success {
            return RunResult {
                compile_error: true,
                ..result
            };
        }
    }
    run_step(project, &run)
}

/// Short user-facing summary of one run.
pub fn format_result(result: &RunResult, project_name: &str, spec: &LanguageSpec, attempt: u32) -> String {
    let lang = spec.name.to_uppercase();
    if result.success {
        let mut message = format!(
            "✅ Projeto '{project_name}' em {lang} executado com sucesso, mestre."
        );
        if !result.stdout.trim().is_empty() {
            message.push_str(&format!(" Saída: {}", truncate(result.stdout.trim(), 200)));
        }
        message
    } else {
        let mut message = if result.compile_error {
            format!("Erro de compilação em {lang} (tentativa {attempt}), mestre.")
        } else {
            format!("Erro ao executar {lang} (tentativa {attempt}), mestre.")
        };
        if !result.stderr.trim().is_empty() {
            message.push_str(&format!(" Erro: {}", truncate(result.stderr.trim(), 300)));
        }
        message
    }
}

/// Truncate on a character boundary.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
