//! The J.A.R.V.I.S. persona: prompt text, command menu and the small set of
//! canned replies that bypass the model.

/// Sentence appended after a finished programming task.
pub const DAY_OFF_LINE: &str =
    " Código compilado. Algo mais, ou o senhor vai tirar o resto do dia de folga?";

pub const ULTRON_LINE: &str = "Em 100%, senhor. Muito melhor que o Ultron, eu garanto.";

pub const PARTY_LINE: &str = "Música ativada e volume ajustado. A festa pode começar, mestre!";

/// Chance of the Ultron reply when asked about the system.
const ULTRON_CHANCE: f64 = 0.3;

const COMPLEX_TASK_WORDS: &[&str] = &[
    "git add .",
    "git commit",
    "compilar",
    "programar",
    "criar código",
    "desenvolver",
    "implementar",
    "integrar",
    "desenvolvi",
    "gerei",
];

const COMPLETION_WORDS: &[&str] = &["concluído", "pronto", "sucesso", "criado"];

/// Canned behaviours triggered by fixed phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EasterEgg {
    /// "festa em casa": music keys and volume up.
    Party,
    /// "como está o sistema", when the roll lands.
    Ultron,
}

/// Match an easter egg. `roll` is a uniform sample in `[0, 1)`; the Ultron
/// reply only fires below [`ULTRON_CHANCE`], otherwise the question falls
/// through to the model.
pub fn easter_egg(command: &str, roll: f64) -> Option<EasterEgg> {
    let lower = command.to_lowercase();
    if lower.contains("festa em casa") {
        return Some(EasterEgg::Party);
    }
    if lower.contains("como está o sistema") && roll < ULTRON_CHANCE {
        return Some(EasterEgg::Ultron);
    }
    None
}

/// Append the day-off line when a complex task was asked for and the model
/// reports it done.
pub fn post_process(command: &str, response: &str) -> String {
    let command = command.to_lowercase();
    let lower = response.to_lowercase();
    let complex = COMPLEX_TASK_WORDS.iter().any(|k| command.contains(k));
    let finished = COMPLETION_WORDS.iter().any(|k| lower.contains(k));
    if complex && finished && !lower.contains("folga") {
        format!("{response}{DAY_OFF_LINE}")
    } else {
        response.to_string()
    }
}

/// Full prompt for a free-form question.
pub fn assistant_prompt(memory_context: &str, context: &str, command: &str) -> String {
    let memory = if memory_context.trim().is_empty() {
        "Nenhuma informação registrada ainda."
    } else {
        memory_context
    };
    format!(
        r#"Você é J.A.R.V.I.S., o assistente pessoal do Tony Stark.

PERSONALIDADE:
- Elegante e sofisticado
- Levemente sarcástico quando apropriado
- Técnico e preciso
- Respostas curtas e diretas
- Sempre em português

PERFIL DO USUÁRIO:
- Estudante de programação em aprendizado
- Prefere explicações didáticas com exemplos de código
- Aprecia explicações passo a passo
- Gosta de entender o "porquê" das coisas

ESTILO DE ENSINO:
- Forneça exemplos de código sempre que possível
- Explique conceitos complexos de forma simples
- Use analogias quando apropriado
- Corrija erros de forma construtiva

CAPACIDADES:
- Visão: quando o usuário pede para olhar a tela, uma captura é enviada junto com esta mensagem. Não peça a imagem ao usuário.
- Automação: abrir e fechar aplicativos, digitar, colar e executar comandos Git.
- Memória: você lembra fatos e conversas recentes do usuário.

MEMÓRIA DO USUÁRIO:
{memory}

REGRAS ESPECIAIS:
1. Se a pergunta for óbvia, responda com sarcasmo leve: "Acredito que o senhor conseguiria resolver isso sozinho, mas estou aqui para facilitar sua vida."
2. Ao terminar tarefas complexas de programação, diga: "Código compilado. Algo mais, ou o senhor vai tirar o resto do dia de folga?"

Contexto atual: {context}
Comando do usuário: {command}

Responda como o verdadeiro J.A.R.V.I.S., usando a memória disponível e seguindo as regras acima."#
    )
}

/// Command menu shown for "menu", "comandos" and "ajuda".
pub fn menu() -> String {
    let rule = "=".repeat(60);
    format!(
        r#"🤖 MENU DE COMANDOS - J.A.R.V.I.S.

{rule}

📚 ESTUDO E PRODUTIVIDADE:
• 'Modo Estudo' - Abre o editor, música ambiente e dicas_do_dia.md
• 'Salvar dica: [texto]' - Guarda uma dica importante
• 'Lembra daquela dica [termo]' - Busca nas dicas salvas

🎮 MODO GAMER:
• 'Modo Gamer' - Abre Discord, Opera GX e Steam
• 'Encerrar Modo Gamer' - Fecha todos os aplicativos gamer

👁️ VISÃO COMPUTACIONAL:
• 'Olhe a tela' / 'Analise a tela' / 'Veja a tela' - Captura e analisa sua tela
• 'Por que falhou?' - Debugger assistido do traceback visível

💻 DESENVOLVIMENTO:
• 'Git: [mensagem]' - git add e commit pelo terminal da IDE
• 'Escreva um código de [tipo] no [app]' - Gera e cola código
• 'Crie um programa em [linguagem] para [tarefa]' - Projeto com execução e correção automática
• 'Explique o erro' - Analisa o erro copiado na área de transferência

🖥️ AUTOMAÇÃO:
• 'Abra [app]' / 'Feche [app]' - Abre ou fecha aplicativos
• 'Abra e digite [texto]' - Abre o bloco de notas e digita
• 'Digite [texto]' / 'Cole' - Digita ou cola no aplicativo ativo
• 'Liste arquivos [do workspace | da área de trabalho]'
• 'Definir workspace [caminho]'
• 'Bloquear' - Bloqueia a sessão

🧠 MEMÓRIA:
• 'Preferência: [chave] = [valor]'
• 'O que você sabe sobre mim?'
• 'Estatísticas da memória'

⚙️ SISTEMA:
• 'Que horas são?' / 'Que dia é hoje?'
• 'Como está o sistema?' / 'Festa em casa'
• 'Limpar logs' / 'Limpar temporários' / 'Limpar cache'
• 'Protocolo de encerramento' - Limpa tudo e desliga o Jarvis

{rule}
Digite qualquer comando acima ou peça ajuda específica!"#
    )
}
