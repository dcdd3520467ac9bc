//! Excel COM Bridge: a Windows process that automates Excel via COM,
//! controlled by JSON commands over stdin/stdout.
//!
//! Designed to be cross-compiled from Linux and run under WINE.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! - Reads `Request` objects from stdin
//! - Writes `Response` objects to stdout
//! - Diagnostics go to stderr (never stdout)
//!
//! COM objects never cross the pipe. Each one is parked in the handle table
//! of [`excel::ExcelApp`] and the client gets a number back.

#[cfg(windows)]
mod dispatch;
#[cfg(windows)]
mod excel;

#[cfg(not(windows))]
fn main() {
    eprintln!("excel-com-bridge must be compiled for Windows (--target x86_64-pc-windows-gnu)");
    eprintln!("and run under WINE on Linux.");
    std::process::exit(1);
}

#[cfg(windows)]
fn main() {
    use std::io::{self, BufRead, Write};

    use excel_com_protocol::{Command, Request, Response, ResponseResult};

    eprintln!("[excel-com-bridge] Starting up...");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut excel: Option<excel::ExcelApp> = None;

    let mut reply = |response: &Response| -> bool {
        let written = serde_json::to_string(response)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                writeln!(out, "{json}")
                    .and_then(|()| out.flush())
                    .map_err(|e| e.to_string())
            });
        match written {
            Ok(()) => true,
            Err(e) => {
                eprintln!("[excel-com-bridge] stdout write error: {e}");
                false
            }
        }
    };

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("[excel-com-bridge] stdin read error: {e}");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("[excel-com-bridge] JSON parse error: {e}; line was: {line}");
                // id 0: the request id could not be read
                let answered = reply(&Response {
                    id: 0,
                    result: ResponseResult::Error {
                        message: format!("JSON parse error: {e}"),
                    },
                });
                if !answered {
                    break;
                }
                continue;
            }
        };

        let shutdown = matches!(request.command, Command::Shutdown);
        let response = Response {
            id: request.id,
            result: handle_command(&mut excel, request.command),
        };
        if !reply(&response) {
            break;
        }
        if shutdown {
            eprintln!("[excel-com-bridge] Shutdown complete, exiting.");
            break;
        }
    }

    // stdin closed without a Shutdown: don't leave Excel running
    if let Some(app) = excel.take() {
        eprintln!("[excel-com-bridge] stdin closed, shutting down Excel...");
        if let Err(e) = app.shutdown() {
            eprintln!("[excel-com-bridge] shutdown failed: {e}");
        }
        uninit_com();
    }

    eprintln!("[excel-com-bridge] Process exiting.");
}

#[cfg(windows)]
fn handle_command(
    excel: &mut Option<excel::ExcelApp>,
    command: excel_com_protocol::Command,
) -> excel_com_protocol::ResponseResult {
    use excel_com_protocol::{Command, ResponseData, ResponseResult};

    let handle = |h: u64| ResponseResult::ok(ResponseData::Handle { handle: h });
    let maybe_handle = |h: Option<u64>| match h {
        Some(h) => ResponseResult::ok(ResponseData::Handle { handle: h }),
        None => ResponseResult::empty(),
    };
    let names = |names: Vec<String>| ResponseResult::ok(ResponseData::Names { names });

    match command {
        Command::Init => init_com_and_excel(excel),
        Command::Shutdown => match excel.take() {
            Some(app) => {
                let result = app.shutdown();
                uninit_com();
                match result {
                    Ok(()) => ResponseResult::empty(),
                    Err(e) => ResponseResult::Error {
                        message: format!("Shutdown failed: {e}"),
                    },
                }
            }
            None => ResponseResult::empty(),
        },
        Command::OpenWorkbook { path } => with_excel(excel, |app| app.open_workbook(&path).map(handle)),
        Command::CreateWorkbook => with_excel(excel, |app| app.create_workbook().map(handle)),
        Command::SaveWorkbook { workbook } => with_excel(excel, |app| {
            app.save_workbook(workbook).map(|()| ResponseResult::empty())
        }),
        Command::SaveWorkbookAs { workbook, path } => with_excel(excel, |app| {
            app.save_workbook_as(workbook, &path)
                .map(|()| ResponseResult::empty())
        }),
        Command::CloseWorkbook { workbook, save } => with_excel(excel, |app| {
            app.close_workbook(workbook, save)
                .map(|()| ResponseResult::empty())
        }),
        Command::GetWorksheet { workbook, name } => {
            with_excel(excel, |app| app.worksheet(workbook, &name).map(maybe_handle))
        }
        Command::ListWorksheets { workbook, limit } => {
            with_excel(excel, |app| app.worksheet_names(workbook, limit).map(names))
        }
        Command::GetName { workbook, name } => {
            with_excel(excel, |app| app.named_range(workbook, &name).map(maybe_handle))
        }
        Command::ListNames { workbook, limit } => {
            with_excel(excel, |app| app.range_names(workbook, limit).map(names))
        }
        Command::GetRange { sheet, address } => {
            with_excel(excel, |app| app.range(sheet, &address).map(handle))
        }
        Command::RangeInfo { range } => with_excel(excel, |app| {
            app.range_info(range)
                .map(|desc| ResponseResult::ok(ResponseData::Range(desc)))
        }),
        Command::GetValues { range } => with_excel(excel, |app| {
            app.read_values(range)
                .map(|values| ResponseResult::ok(ResponseData::Values { values }))
        }),
        Command::SetValues { range, values } => with_excel(excel, |app| {
            app.write_values(range, &values)
                .map(|()| ResponseResult::empty())
        }),
        Command::GetFormulas { range } => with_excel(excel, |app| {
            app.read_formulas(range)
                .map(|formulas| ResponseResult::ok(ResponseData::Formulas { formulas }))
        }),
        Command::SetFormulas { range, formulas } => with_excel(excel, |app| {
            app.write_formulas(range, &formulas)
                .map(|()| ResponseResult::empty())
        }),
        Command::Release { handle } => with_excel(excel, |app| {
            app.release(handle);
            Ok(ResponseResult::empty())
        }),
    }
}

#[cfg(windows)]
fn init_com_and_excel(excel: &mut Option<excel::ExcelApp>) -> excel_com_protocol::ResponseResult {
    use excel_com_protocol::{ResponseData, ResponseResult};
    use windows::Win32::System::Com::{CoInitializeEx, COINIT_APARTMENTTHREADED};

    if let Some(app) = excel.as_ref() {
        return ResponseResult::ok(ResponseData::Handle {
            handle: app.application_handle(),
        });
    }

    // Excel wants a single-threaded apartment
    unsafe {
        if let Err(e) = CoInitializeEx(None, COINIT_APARTMENTTHREADED).ok() {
            return ResponseResult::Error {
                message: format!("CoInitializeEx failed: {e}"),
            };
        }
    }
    eprintln!("[excel-com-bridge] COM initialized (STA)");

    match excel::ExcelApp::new() {
        Ok(app) => {
            eprintln!("[excel-com-bridge] Excel.Application created successfully");
            let handle = app.application_handle();
            *excel = Some(app);
            ResponseResult::ok(ResponseData::Handle { handle })
        }
        Err(e) => {
            uninit_com();
            ResponseResult::Error {
                message: format!("Failed to create Excel.Application: {e}"),
            }
        }
    }
}

#[cfg(windows)]
fn uninit_com() {
    unsafe {
        windows::Win32::System::Com::CoUninitialize();
    }
    eprintln!("[excel-com-bridge] COM uninitialized");
}

#[cfg(windows)]
fn with_excel(
    excel: &mut Option<excel::ExcelApp>,
    f: impl FnOnce(&mut excel::ExcelApp) -> Result<excel_com_protocol::ResponseResult, String>,
) -> excel_com_protocol::ResponseResult {
    match excel.as_mut() {
        Some(app) => f(app).unwrap_or_else(|message| excel_com_protocol::ResponseResult::Error { message }),
        None => excel_com_protocol::ResponseResult::Error {
            message: "Excel not initialized. Send 'Init' command first.".to_string(),
        },
    }
}
