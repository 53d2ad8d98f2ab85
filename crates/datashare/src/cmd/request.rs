use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use datashare_cursor::PageWindow;
use datashare_peer::{
    Bundle, Consumer, ConsumerConfig, DeleteRequest, InsertRequest, MapGetRequest, MapSetRequest,
    MapValueRequest, ProviderRef, Request, Response, SelectRequest, SocketDirActivator,
    UpdateRequest,
};
use tracing::debug;

use crate::cmd::{
    DeleteArgs, InsertArgs, MapGetArgs, MapSetArgs, MapValueArgs, PageArgs, SelectArgs,
    TargetArgs, UpdateArgs,
};
use crate::exit::{peer_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat, ResponseOutput};

pub fn select(args: SelectArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::Select(SelectRequest {
        columns: args.columns,
        where_clause: args.where_clause,
        order: args.order,
        window: window(&args.page)?,
    });
    execute(&args.target, request, format)
}

pub fn insert(args: InsertArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::Insert(InsertRequest {
        values: parse_assignments(&args.values)?,
    });
    execute(&args.target, request, format)
}

pub fn update(args: UpdateArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::Update(UpdateRequest {
        values: parse_assignments(&args.values)?,
        where_clause: args.where_clause,
    });
    execute(&args.target, request, format)
}

pub fn delete(args: DeleteArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::Delete(DeleteRequest {
        where_clause: args.where_clause,
    });
    execute(&args.target, request, format)
}

pub fn map_get(args: MapGetArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::MapGet(MapGetRequest {
        key: args.key,
        window: window(&args.page)?,
    });
    execute(&args.target, request, format)
}

pub fn map_set(args: MapSetArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::MapSet(MapSetRequest {
        key: args.key,
        old_value: args.old_value,
        new_value: args.new_value,
    });
    execute(&args.target, request, format)
}

pub fn map_add(args: MapValueArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::MapAdd(map_value(args.key, args.value));
    execute(&args.target, request, format)
}

pub fn map_remove(args: MapValueArgs, format: OutputFormat) -> CliResult<i32> {
    let request = Request::MapRemove(map_value(args.key, args.value));
    execute(&args.target, request, format)
}

fn map_value(key: String, value: String) -> MapValueRequest {
    MapValueRequest { key, value }
}

fn window(page: &PageArgs) -> CliResult<PageWindow> {
    PageWindow::new(page.page, page.per_page)
        .map_err(|err| CliError::new(USAGE, format!("invalid page: {err}")))
}

/// Send one request and print its response.
///
/// Exits 0 when the provider reports success and 1 when it reports failure.
fn execute(target: &TargetArgs, request: Request, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&target.timeout)?;
    let provider = ProviderRef::new(target.provider_id.as_str(), target.data_id.as_str())
        .map_err(|err| CliError::new(USAGE, err.to_string()))?;
    let config = ConsumerConfig {
        response_timeout: timeout,
        launch_attempts: 1,
        ..ConsumerConfig::default()
    };

    let slot: Rc<RefCell<Option<Response>>> = Rc::default();
    let sink = Rc::clone(&slot);
    let mut consumer = Consumer::with_config(
        target.caller_id.as_str(),
        SocketDirActivator::new(&target.dir),
        move |response: Response| *sink.borrow_mut() = Some(response),
        config,
    );

    let kind = request.kind();
    let request_id = consumer
        .send(&provider, request)
        .map_err(|err| peer_error(&format!("{kind} request failed"), err))?;
    debug!(request_id, %kind, "request sent");
    consumer
        .wait_for(request_id)
        .map_err(|err| peer_error("waiting for response failed", err))?;
    drop(consumer);

    let response = slot
        .borrow_mut()
        .take()
        .ok_or_else(|| CliError::new(INTERNAL, "request resolved without a response"))?;
    let success = response.provider_result;
    let out = ResponseOutput::from_response(response)
        .map_err(|err| CliError::new(INTERNAL, format!("failed reading result set: {err}")))?;
    print_response(&out, format);

    Ok(if success { SUCCESS } else { FAILURE })
}

/// Turn `column=value` arguments into a bundle.
fn parse_assignments(raw: &[String]) -> CliResult<Bundle> {
    let mut values = Bundle::new();
    for assignment in raw {
        let (column, value) = assignment
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("expected COLUMN=VALUE, got {assignment}")))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(CliError::new(USAGE, format!("empty column in {assignment}")));
        }
        values.insert_str(column, value);
    }
    Ok(values)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
