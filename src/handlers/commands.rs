#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Photo(String),
    Name(String),
    Age(String),
    Traits(String),
    Analyze,
    ExportPng,
    ExportPdf,
    Reset,
    Show,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("알 수 없는 명령이에요: {0} (`help`를 입력해보세요)")]
    Unknown(String),
    #[error("사용법: {0}")]
    Usage(&'static str),
}

pub fn help_text() -> &'static str {
    "명령어:\n\
     \x20 photo <경로>    사진 선택\n\
     \x20 name <텍스트>   이름 또는 닉네임\n\
     \x20 age <텍스트>    학년 또는 나이\n\
     \x20 traits <텍스트> 아이의 특별한 점\n\
     \x20 analyze         새싹 분석 시작\n\
     \x20 png | pdf       결과 저장\n\
     \x20 reset           다시 시작\n\
     \x20 show            화면 다시 그리기\n\
     \x20 quit            종료"
}

fn split_command(line: &str) -> (String, &str) {
    let trimmed = line.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword.to_lowercase(), rest.trim()),
        None => (trimmed.to_lowercase(), ""),
    }
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let (keyword, argument) = split_command(line);
    let command = match keyword.as_str() {
        "" => return Ok(None),
        "photo" | "image" | "upload" => {
            if argument.is_empty() {
                return Err(CommandError::Usage("photo <경로>"));
            }
            Command::Photo(argument.to_string())
        }
        "name" => Command::Name(argument.to_string()),
        "age" | "grade" => Command::Age(argument.to_string()),
        "traits" | "trait" => Command::Traits(argument.to_string()),
        "analyze" | "submit" => Command::Analyze,
        "png" => Command::ExportPng,
        "pdf" => Command::ExportPdf,
        "save" => match argument.to_lowercase().as_str() {
            "png" => Command::ExportPng,
            "pdf" => Command::ExportPdf,
            _ => return Err(CommandError::Usage("save <png|pdf>")),
        },
        "reset" | "restart" => Command::Reset,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}
